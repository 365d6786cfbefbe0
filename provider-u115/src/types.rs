//! 115 API response types
//!
//! The web APIs are loose about scalar types: identifiers and sizes arrive as
//! numbers or strings depending on the endpoint, so those fields go through
//! [`flex_string`] / [`flex_u64`].

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::UInt(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Number-or-string as `String`
pub fn flex_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

/// Optional number-or-string as `Option<String>`; empty strings become `None`
pub fn flex_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.map(Scalar::into_string).filter(|s| !s.is_empty()))
}

/// Optional number-or-string as `Option<u64>`
pub fn flex_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.into_string().parse().ok()))
}

/// Optional number-or-string as `Option<i64>`
pub fn flex_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.into_string().parse().ok()))
}

/// Entry of `files` / `share/snap` / `share/search`
///
/// Files carry `fid` with `cid` as their parent; directories carry `cid` as
/// their own id and `pid` as the parent.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    #[serde(default, deserialize_with = "flex_opt_string")]
    pub fid: Option<String>,

    #[serde(default, deserialize_with = "flex_opt_string")]
    pub cid: Option<String>,

    #[serde(default, deserialize_with = "flex_opt_string")]
    pub pid: Option<String>,

    /// Name
    #[serde(rename = "n", default)]
    pub name: String,

    /// Pickcode
    #[serde(rename = "pc", default, deserialize_with = "flex_opt_string")]
    pub pickcode: Option<String>,

    /// Size in bytes
    #[serde(rename = "s", default, deserialize_with = "flex_u64")]
    pub size: Option<u64>,
}

/// `GET webapi.115.com/files`
#[derive(Debug, Deserialize)]
pub struct FilesResponse {
    #[serde(default, deserialize_with = "flex_u64")]
    pub count: Option<u64>,

    #[serde(default)]
    pub data: Vec<FileEntry>,
}

/// `GET webapi.115.com/files/getid`
#[derive(Debug, Deserialize)]
pub struct GetIdResponse {
    #[serde(deserialize_with = "flex_string")]
    pub id: String,
}

/// `GET webapi.115.com/category/get`
#[derive(Debug, Deserialize)]
pub struct CategoryResponse {
    #[serde(default)]
    pub file_name: String,

    /// Ancestors from the root down, excluding the directory itself
    #[serde(default)]
    pub paths: Vec<CategoryPath>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPath {
    #[serde(deserialize_with = "flex_string")]
    pub file_id: String,

    #[serde(default)]
    pub file_name: String,
}

/// `GET webapi.115.com/files/download`
#[derive(Debug, Deserialize)]
pub struct WebDownloadResponse {
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub file_url: Option<String>,

    #[serde(default, deserialize_with = "flex_u64")]
    pub file_size: Option<u64>,
}

/// Encrypted envelope of the app endpoints
#[derive(Debug, Deserialize)]
pub struct EncryptedResponse {
    pub data: String,
}

/// Decrypted payload of `/{app}/2.0/ufile/download`
#[derive(Debug, Deserialize)]
pub struct AppDownloadPayload {
    pub url: String,

    #[serde(default, deserialize_with = "flex_u64")]
    pub file_size: Option<u64>,
}

/// One value of the decrypted `app/chrome/downurl` map (keyed by file id)
#[derive(Debug, Deserialize)]
pub struct ChromeDownloadInfo {
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default, deserialize_with = "flex_u64")]
    pub file_size: Option<u64>,

    /// `{"url": "..."}`, or `false` when the file is unavailable
    #[serde(default)]
    pub url: serde_json::Value,
}

/// `data` of `share/snap` and `share/search`
#[derive(Debug, Deserialize)]
pub struct ShareListData {
    #[serde(default, deserialize_with = "flex_u64")]
    pub count: Option<u64>,

    #[serde(default)]
    pub list: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// `data` of `share/shareinfo`
#[derive(Debug, Deserialize)]
pub struct ShareInfoData {
    #[serde(default)]
    pub receive_code: Option<String>,
}

/// `data` of `share/downurl`
#[derive(Debug, Deserialize)]
pub struct ShareDownloadData {
    /// File name
    #[serde(rename = "fn", default)]
    pub file_name: Option<String>,

    /// File size
    #[serde(rename = "fs", default, deserialize_with = "flex_u64")]
    pub file_size: Option<u64>,

    /// `{"url": "..."}`, or `false` when the share is unavailable
    #[serde(default)]
    pub url: serde_json::Value,
}

/// `data` of `life/life_list`
#[derive(Debug, Deserialize)]
pub struct LifeListData {
    #[serde(default)]
    pub list: Vec<LifeGroup>,
}

/// A batch of items sharing one behaviour type
#[derive(Debug, Deserialize)]
pub struct LifeGroup {
    #[serde(rename = "type", default, deserialize_with = "flex_i64")]
    pub type_code: Option<i64>,

    #[serde(default, deserialize_with = "flex_i64")]
    pub update_time: Option<i64>,

    #[serde(default)]
    pub items: Vec<LifeItem>,
}

#[derive(Debug, Deserialize)]
pub struct LifeItem {
    #[serde(deserialize_with = "flex_string")]
    pub file_id: String,

    #[serde(default)]
    pub file_name: String,

    #[serde(default, deserialize_with = "flex_opt_string")]
    pub parent_id: Option<String>,

    #[serde(default, deserialize_with = "flex_opt_string")]
    pub pick_code: Option<String>,

    /// `0` for folders
    #[serde(default, deserialize_with = "flex_i64")]
    pub file_category: Option<i64>,

    #[serde(default, deserialize_with = "flex_i64")]
    pub update_time: Option<i64>,
}

/// Pulls `{"url": "..."}` out of a loosely typed field
pub fn nested_url(value: &serde_json::Value) -> Option<String> {
    value
        .get("url")
        .and_then(|url| url.as_str())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
