//! Command lines for the sandboxed build tool

use crate::catalog::BuildTarget;
use crate::config::Config;

const GLOB_CHARS: [char; 3] = ['*', '{', '?'];

/// True when the target must be passed with `--target-glob`
pub fn is_glob(target: &str) -> bool {
    target.contains(&GLOB_CHARS[..])
}

/// Builds argv vectors for the discovery and build invocations
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    exec: Vec<String>,
    activate: String,
    tool: String,
    enable_flashbundle: bool,
    discovery_args: Vec<String>,
}

impl CommandBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            // Validated when the config is loaded
            exec: shlex::split(&config.sandbox.exec).unwrap_or_default(),
            activate: config.build.activate.clone(),
            tool: config.build.tool.clone(),
            enable_flashbundle: config.build.enable_flashbundle,
            discovery_args: config.build.discovery_args.clone(),
        }
    }

    /// Shell script that builds a single target (or glob of targets)
    pub fn build_script(&self, target: &BuildTarget) -> String {
        let mut script = format!("{} --no-log-timestamps", self.tool);
        if self.enable_flashbundle {
            script.push_str(" --enable-flashbundle");
        }

        let flag = if is_glob(&target.name) {
            "--target-glob"
        } else {
            "--target"
        };
        script.push_str(&format!(" {} \"{}\" build", flag, quote(&target.name)));

        self.with_prelude(&script, false)
    }

    /// Shell script that lists every target, one per line
    pub fn discovery_script(&self) -> String {
        let mut script = self.tool.clone();
        for arg in &self.discovery_args {
            script.push(' ');
            script.push_str(arg);
        }
        self.with_prelude(&script, true)
    }

    pub fn build_argv(&self, target: &BuildTarget) -> Vec<String> {
        self.wrap(self.build_script(target))
    }

    pub fn discovery_argv(&self) -> Vec<String> {
        self.wrap(self.discovery_script())
    }

    fn with_prelude(&self, script: &str, quiet: bool) -> String {
        if self.activate.trim().is_empty() {
            return script.to_string();
        }
        if quiet {
            format!("{} >/dev/null 2>&1 && {}", self.activate, script)
        } else {
            format!("{} && {}", self.activate, script)
        }
    }

    fn wrap(&self, script: String) -> Vec<String> {
        let mut argv = self.exec.clone();
        argv.push(script);
        argv
    }
}

/// Escape for use inside a double-quoted shell word
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CommandBuilder {
        let mut config = Config::default();
        config.sandbox.exec = "podman exec -w /workspace bld /bin/bash -c".to_string();
        CommandBuilder::new(&config)
    }

    #[test]
    fn test_exact_target_flag() {
        let script = builder().build_script(&BuildTarget::new("linux-x64-all-clusters"));
        assert_eq!(
            script,
            "source ./scripts/activate.sh && ./scripts/build/build_examples.py \
             --no-log-timestamps --enable-flashbundle --target \"linux-x64-all-clusters\" build"
        );
    }

    #[test]
    fn test_glob_target_flag() {
        let script = builder().build_script(&BuildTarget::new("linux-x64-*"));
        assert!(script.contains("--target-glob \"linux-x64-*\" build"));
        assert!(!script.contains("--target \""));

        assert!(is_glob("efr32-{a,b}"));
        assert!(is_glob("esp32-?"));
        assert!(!is_glob("esp32-m5stack"));
    }

    #[test]
    fn test_flashbundle_optional() {
        let mut config = Config::default();
        config.build.enable_flashbundle = false;
        let script = CommandBuilder::new(&config).build_script(&BuildTarget::new("a"));
        assert!(!script.contains("--enable-flashbundle"));
    }

    #[test]
    fn test_argv_wraps_single_script() {
        let argv = builder().build_argv(&BuildTarget::new("a"));
        assert_eq!(&argv[..6], &["podman", "exec", "-w", "/workspace", "bld", "/bin/bash"]);
        assert_eq!(argv[6], "-c");
        assert_eq!(argv.len(), 8);
        assert!(argv[7].ends_with("--target \"a\" build"));
    }

    #[test]
    fn test_discovery_silences_prelude() {
        assert_eq!(
            builder().discovery_script(),
            "source ./scripts/activate.sh >/dev/null 2>&1 && \
             ./scripts/build/build_examples.py --log-level fatal targets --expand"
        );
    }

    #[test]
    fn test_exec_wrapper_keeps_quoted_words() {
        let mut config = Config::default();
        config.sandbox.exec = r#"docker exec -w "/home/me/my ws" bld /bin/bash -c"#.to_string();
        let argv = CommandBuilder::new(&config).build_argv(&BuildTarget::new("a"));

        assert_eq!(
            &argv[..7],
            &["docker", "exec", "-w", "/home/me/my ws", "bld", "/bin/bash", "-c"]
        );
        assert_eq!(argv.len(), 8);
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote(r#"a"b$c`d\e"#), r#"a\"b\$c\`d\\e"#);
    }
}
