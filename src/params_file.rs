use std::path::PathBuf;

#[derive(Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConvParams {
    #[serde(rename = "authors-file")]
    pub(crate) authors_file: Option<PathBuf>,
    #[serde(rename = "skip-binaries", default = "false_")]
    pub(crate) skip_binaries: bool,
    #[serde(rename = "author-fallback-template")]
    pub(crate) author_fallback_template: Option<String>,
    #[serde(rename = "commit-msg-template")]
    pub(crate) commit_msg_template: Option<String>,
}

#[inline(always)]
fn false_() -> bool {
    false
}
