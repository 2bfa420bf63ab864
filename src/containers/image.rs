//! Image selection and local image builds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::executor::git_config_value;

/// Image every program runs in unless configured otherwise.
pub const DEFAULT_IMAGE: &str = "agentbox/enhanced:latest";

/// Pick the image for `program`.
///
/// Precedence: explicit override, exact mapping entry, longest mapping key
/// that prefixes `program`, then `default`.
pub fn resolve_image(
    program: &str,
    image_override: Option<&str>,
    mappings: &BTreeMap<String, String>,
    default: &str,
) -> String {
    if let Some(image) = image_override.filter(|i| !i.is_empty()) {
        return image.to_string();
    }

    if let Some(image) = mappings.get(program) {
        return image.clone();
    }

    mappings
        .iter()
        .filter(|(prefix, _)| !prefix.is_empty() && program.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, image)| image.clone())
        .unwrap_or_else(|| default.to_string())
}

/// Host user and git identity baked into locally built images so files
/// written under `/workspace` keep the operator's ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
}

impl HostIdentity {
    pub async fn detect() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            git_user_name: git_config_value("user.name").await,
            git_user_email: git_config_value("user.email").await,
        }
    }
}

/// Shell-escape a value for safe interpolation into a shell command string.
pub(crate) fn shell_escape(val: &str) -> String {
    let escaped = val
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("\"{}\"", escaped)
}

/// Compose the `docker build` invocation for `image` from `context/Dockerfile`.
pub fn build_command_line(image: &str, context: &Path, identity: &HostIdentity) -> String {
    let mut args = vec![
        format!("--build-arg USER_UID={}", identity.uid),
        format!("--build-arg USER_GID={}", identity.gid),
    ];

    if let Some(name) = &identity.git_user_name {
        args.push(format!("--build-arg GIT_USER_NAME={}", shell_escape(name)));
    }
    if let Some(email) = &identity.git_user_email {
        args.push(format!("--build-arg GIT_USER_EMAIL={}", shell_escape(email)));
    }

    let dockerfile = context.join("Dockerfile");
    format!(
        "docker build {} -t {} -f {} {}",
        args.join(" "),
        shell_escape(image),
        shell_escape(&dockerfile.to_string_lossy()),
        shell_escape(&context.to_string_lossy()),
    )
}

/// Nearest `docker/` directory holding a Dockerfile, walking up from `start`.
pub fn find_build_context(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("docker"))
        .find(|candidate| candidate.join("Dockerfile").is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_override_wins_over_everything() {
        let map = mappings(&[("aider --model x", "img-exact"), ("aider", "img-prefix")]);
        let image = resolve_image("aider --model x", Some("img-x"), &map, DEFAULT_IMAGE);
        assert_eq!(image, "img-x");
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        let map = mappings(&[("aider --model x", "img-exact"), ("aider", "img-prefix")]);
        let image = resolve_image("aider --model x", None, &map, DEFAULT_IMAGE);
        assert_eq!(image, "img-exact");
    }

    #[test]
    fn test_prefix_match_for_programs_with_arguments() {
        let map = mappings(&[("aider", "img-prefix")]);
        let image = resolve_image("aider --yes", None, &map, DEFAULT_IMAGE);
        assert_eq!(image, "img-prefix");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let map = mappings(&[("gem", "img-short"), ("gemini", "img-long"), ("g", "img-g")]);
        let image = resolve_image("gemini --sandbox", None, &map, DEFAULT_IMAGE);
        assert_eq!(image, "img-long");
    }

    #[test]
    fn test_default_when_nothing_matches() {
        let map = mappings(&[("aider", "img-prefix")]);
        assert_eq!(resolve_image("claude", None, &map, DEFAULT_IMAGE), DEFAULT_IMAGE);
        assert_eq!(
            resolve_image("claude", None, &BTreeMap::new(), "custom/default:1"),
            "custom/default:1"
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let image = resolve_image("claude", Some(""), &BTreeMap::new(), DEFAULT_IMAGE);
        assert_eq!(image, DEFAULT_IMAGE);
    }

    #[test]
    fn test_build_command_line_includes_identity() {
        let identity = HostIdentity {
            uid: 1000,
            gid: 1001,
            git_user_name: Some("Ada Lovelace".to_string()),
            git_user_email: Some("ada@example.com".to_string()),
        };
        let line = build_command_line(DEFAULT_IMAGE, Path::new("/repo/docker"), &identity);

        assert!(line.starts_with("docker build "));
        assert!(line.contains("--build-arg USER_UID=1000"));
        assert!(line.contains("--build-arg USER_GID=1001"));
        assert!(line.contains("--build-arg GIT_USER_NAME=\"Ada Lovelace\""));
        assert!(line.contains("--build-arg GIT_USER_EMAIL=\"ada@example.com\""));
        assert!(line.contains("-t \"agentbox/enhanced:latest\""));
        assert!(line.ends_with("-f \"/repo/docker/Dockerfile\" \"/repo/docker\""));
    }

    #[test]
    fn test_build_command_line_skips_missing_git_identity() {
        let identity = HostIdentity {
            uid: 0,
            gid: 0,
            git_user_name: None,
            git_user_email: None,
        };
        let line = build_command_line("img", Path::new("/ctx"), &identity);
        assert!(!line.contains("GIT_USER_NAME"));
        assert!(!line.contains("GIT_USER_EMAIL"));
    }

    #[test]
    fn test_shell_escape_neutralises_expansion() {
        assert_eq!(shell_escape("$(rm -rf ~)"), "\"\\$(rm -rf ~)\"");
        assert_eq!(shell_escape("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(shell_escape("run `cmd`"), "\"run \\`cmd\\`\"");
    }

    #[test]
    fn test_find_build_context_walks_up() {
        let root = tempfile::TempDir::new().unwrap();
        let docker_dir = root.path().join("docker");
        std::fs::create_dir_all(&docker_dir).unwrap();
        std::fs::write(docker_dir.join("Dockerfile"), "FROM scratch\n").unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_build_context(&nested), Some(docker_dir));
    }

    #[test]
    fn test_find_build_context_none_without_dockerfile() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("docker")).unwrap();
        // An ancestor of the tempdir could in principle hold docker/Dockerfile,
        // so only assert the tempdir's own docker dir is not picked.
        let found = find_build_context(root.path());
        assert_ne!(found, Some(root.path().join("docker")));
    }
}
