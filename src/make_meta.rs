use crate::author_map::AuthorMap;
use crate::convert::GitCommitMeta;
use crate::darcs::inventory::PatchInfo;

pub(crate) struct GitMetaMaker<'a> {
    author_map: &'a AuthorMap,
    jinja_env: minijinja::Environment<'a>,
}

impl<'a> GitMetaMaker<'a> {
    pub(crate) fn new(
        author_map: &'a AuthorMap,
        author_fallback_template: &'a str,
        commit_msg_template: &'a str,
    ) -> Result<Self, String> {
        let mut jinja_env = minijinja::Environment::empty();
        jinja_env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);

        jinja_env
            .add_template("author_fallback", author_fallback_template)
            .map_err(|e| format!("failed to parse author fallback template: {e}"))?;
        jinja_env
            .add_template("commit_msg", commit_msg_template)
            .map_err(|e| format!("failed to parse commit message template: {e}"))?;

        Ok(Self {
            author_map,
            jinja_env,
        })
    }

    fn convert_author(
        &self,
        jinja_ctx: &JinjaCtx,
        darcs_author: &[u8],
    ) -> Result<(String, String), String> {
        let identity = match self.author_map.get(darcs_author) {
            Some(identity) => identity.to_owned(),
            None => {
                let template = self.jinja_env.get_template("author_fallback").unwrap();
                template
                    .render(jinja_ctx)
                    .map_err(|e| format!("failed to render fallback author: {e}"))?
            }
        };

        let Some((name, email)) = split_author_name_email(&identity) else {
            return Err(format!(
                "author {identity:?} is not in \"name <email>\" format"
            ));
        };

        Ok((name.into(), email.into()))
    }
}

impl crate::convert::GitMetaMaker for GitMetaMaker<'_> {
    fn make_git_commit_meta(
        &self,
        patch: &PatchInfo,
        patch_filename: &str,
    ) -> Result<GitCommitMeta, String> {
        let jinja_ctx = JinjaCtx::new(patch, patch_filename, self.author_map);

        let (author_name, author_email) = self.convert_author(&jinja_ctx, &patch.author)?;

        let git_time = gix_date::Time {
            seconds: patch.date.and_utc().timestamp(),
            offset: 0,
        };

        let msg_template = self.jinja_env.get_template("commit_msg").unwrap();
        let message = msg_template
            .render(&jinja_ctx)
            .map_err(|e| format!("failed to render git commit message: {e}"))?
            .replace("\r\n", "\n");

        Ok(GitCommitMeta {
            author: gix_actor::Signature {
                name: author_name.into(),
                email: author_email.into(),
                time: git_time,
            },
            message,
        })
    }
}

#[derive(serde::Serialize)]
struct JinjaCtx {
    darcs_name: String,
    darcs_author: String,
    darcs_log: String,
    darcs_patch: String,
    darcs_inverted: bool,
    mapped_author: String,
}

impl JinjaCtx {
    fn new(patch: &PatchInfo, patch_filename: &str, author_map: &AuthorMap) -> Self {
        let mapped_author = author_map
            .get(&patch.author)
            .map(String::from)
            .unwrap_or_default();

        Self {
            darcs_name: String::from_utf8_lossy(&patch.name).into_owned(),
            darcs_author: String::from_utf8_lossy(&patch.author).into_owned(),
            darcs_log: patch
                .log
                .as_deref()
                .map(|log| String::from_utf8_lossy(log).into_owned())
                .unwrap_or_default(),
            darcs_patch: patch_filename.to_owned(),
            darcs_inverted: patch.inverted,
            mapped_author,
        }
    }
}

fn split_author_name_email(raw: &str) -> Option<(&str, &str)> {
    if raw.contains('\n') {
        return None;
    }

    let i_lt = raw.find('<')?;

    let name = raw[..i_lt].trim_matches(' ');
    let email = raw[(i_lt + 1)..]
        .trim_end_matches(' ')
        .strip_suffix('>')?
        .trim_matches(' ');

    Some((name, email))
}

#[cfg(test)]
mod test {
    use super::split_author_name_email;

    #[test]
    fn test_split_author_name_email() {
        assert_eq!(
            split_author_name_email("Joe Bloggs <joe@example.com>"),
            Some(("Joe Bloggs", "joe@example.com")),
        );
        assert_eq!(
            split_author_name_email("<joe@example.com>"),
            Some(("", "joe@example.com")),
        );
        assert_eq!(split_author_name_email("joe@example.com"), None);
        assert_eq!(split_author_name_email("Joe <joe@example.com"), None);
    }
}
