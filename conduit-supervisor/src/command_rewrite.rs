//! The `uvx` command-rewrite rule (spec.md §4.1 "Command rewrite rule").
//! Call sites rely on this rewrite happening before spawn, so it is kept as
//! a pure function that is easy to unit test in isolation.

/// Rewrites `command`/`args` per the `uvx` convention. Returns the
/// (possibly unchanged) `(command, args)` pair to actually exec.
pub fn rewrite_uvx(command: &str, args: &[String]) -> (String, Vec<String>) {
    if command == "uvx" {
        let mut rewritten = vec!["tool".to_string(), "run".to_string()];
        rewritten.extend(args.iter().cloned());
        return ("uv".to_string(), rewritten);
    }

    if let Some(suffix) = command.strip_prefix("uvx ") {
        return ("uv".to_string(), {
            let mut parts = vec!["run".to_string()];
            parts.extend(suffix.split_whitespace().map(|s| s.to_string()));
            parts
        });
    }

    (command.to_string(), args.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_uvx_rewrites_to_uv_tool_run() {
        let (cmd, args) = rewrite_uvx("uvx", &["mcp-server-time".to_string(), "--local-timezone=UTC".to_string()]);
        assert_eq!(cmd, "uv");
        assert_eq!(args, vec!["tool", "run", "mcp-server-time", "--local-timezone=UTC"]);
    }

    #[test]
    fn uvx_prefixed_command_rewrites_and_clears_args() {
        let (cmd, args) = rewrite_uvx("uvx mcp-server-fetch --debug", &["ignored".to_string()]);
        assert_eq!(cmd, "uv");
        assert_eq!(args, vec!["run", "mcp-server-fetch", "--debug"]);
    }

    #[test]
    fn other_commands_pass_through_unchanged() {
        let (cmd, args) = rewrite_uvx("node", &["server.js".to_string()]);
        assert_eq!(cmd, "node");
        assert_eq!(args, vec!["server.js"]);
    }
}
