use std::collections::BTreeMap;

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Test {
    pub(crate) patches: Vec<Patch>,
    #[serde(rename = "conv-params")]
    pub(crate) conv_params: Option<String>,
    pub(crate) authors: Option<String>,
    #[serde(rename = "dry-run", default = "false_")]
    pub(crate) dry_run: bool,
    #[serde(default = "false_")]
    pub(crate) failed: bool,
    pub(crate) logs: Option<String>,
    #[serde(rename = "git-revs", default = "Vec::new")]
    pub(crate) git_revs: Vec<GitRev>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Patch {
    pub(crate) name: String,
    pub(crate) author: String,
    pub(crate) timestamp: String,
    pub(crate) log: Option<String>,
    #[serde(default = "false_")]
    pub(crate) inverted: bool,
    pub(crate) body: String,
    /// store the body uncompressed to exercise the gzip sniffing
    #[serde(rename = "store-plain", default = "false_")]
    pub(crate) store_plain: bool,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GitRev {
    pub(crate) rev: String,
    pub(crate) author: Option<GitSignature>,
    pub(crate) message: Option<String>,
    #[serde(rename = "message-prefix")]
    pub(crate) message_prefix: Option<String>,
    /// when set, the commit must (or must not) have parents
    pub(crate) root: Option<bool>,
    pub(crate) tree: Option<BTreeMap<String, GitTreeEntry>>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GitSignature {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) time: Option<GitTime>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GitTime {
    pub(crate) seconds: i64,
    #[serde(default = "zero")]
    pub(crate) offset: u32,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub(crate) enum GitTreeEntry {
    #[serde(rename = "normal")]
    Normal { data: String },
    #[serde(rename = "dir")]
    Dir,
}

#[inline(always)]
fn false_() -> bool {
    false
}

#[inline(always)]
fn zero() -> u32 {
    0
}
