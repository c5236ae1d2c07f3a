use super::*;

fn parse(content: &str) -> Result<CompilerConfig> {
    CompilerConfig::parse(content, Path::new("kernelforge.toml"))
}

fn config_error(content: &str) -> String {
    match parse(content) {
        Err(Error::Config { message }) => message,
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn test_defaults() {
    let config = CompilerConfig::default();
    assert_eq!(config.dxc_path, PathBuf::from("dxc"));
    assert_eq!(config.profile, "cs_6_0");
    assert_eq!(config.optimization, 3);
    assert!(config.extra_args.is_empty());
    assert_eq!(config.thread_group, [64, 1, 1]);
    assert_eq!(config.pool_capacity, 16);
}

#[test]
fn test_empty_file_is_default() {
    assert_eq!(parse("").unwrap(), CompilerConfig::default());
    assert_eq!(parse("# nothing here\n\n").unwrap(), CompilerConfig::default());
}

#[test]
fn test_parse_all_keys() {
    let config = parse(
        r#"
# shader compiler
[compiler]
dxc = "/opt/dxc/bin/dxc"
profile = "cs_6_6"
optimization = 1   # faster builds
args = ["-enable-16bit-types", "-HV", "2021"]

[dispatch]
thread_group = [8, 8, 1]
pool_capacity = 4
"#,
    )
    .unwrap();
    assert_eq!(config.dxc_path, PathBuf::from("/opt/dxc/bin/dxc"));
    assert_eq!(config.profile, "cs_6_6");
    assert_eq!(config.optimization, 1);
    assert_eq!(config.extra_args, vec!["-enable-16bit-types", "-HV", "2021"]);
    assert_eq!(config.thread_group, [8, 8, 1]);
    assert_eq!(config.pool_capacity, 4);
}

#[test]
fn test_hash_inside_string_is_kept() {
    let config = parse("[compiler]\ndxc = \"/tools/#1/dxc\"\n").unwrap();
    assert_eq!(config.dxc_path, PathBuf::from("/tools/#1/dxc"));
}

#[test]
fn test_other_sections_are_ignored() {
    let config = parse("[package]\nname = \"demo\"\n[compiler]\nprofile = \"cs_6_2\"\n").unwrap();
    assert_eq!(config.profile, "cs_6_2");
}

#[test]
fn test_invalid_values() {
    assert!(config_error("[compiler]\nprofile = \"ps_6_0\"\n").contains("invalid compiler.profile 'ps_6_0'"));
    assert!(config_error("[compiler]\noptimization = 4\n").contains("invalid compiler.optimization: 4"));
    assert!(config_error("[compiler]\noptimization = fast\n").contains("invalid compiler.optimization"));
    assert!(config_error("[compiler]\nargs = \"-O3\"\n").contains("compiler.args must be an array"));
    assert!(config_error("[compiler]\ndxc = \"\"\n").contains("compiler.dxc must not be empty"));
    assert!(config_error("[dispatch]\npool_capacity = -1\n").contains("invalid dispatch.pool_capacity"));
    assert!(config_error("[compiler]\nverbose = true\n").contains("unknown key compiler.verbose"));
    assert!(config_error("[compiler]\njust text\n").contains("line 2: expected `key = value`"));
}

#[test]
fn test_invalid_thread_group() {
    assert!(config_error("[dispatch]\nthread_group = [64, 1]\n").contains("invalid dispatch.thread_group"));
    assert!(config_error("[dispatch]\nthread_group = 64\n").contains("invalid dispatch.thread_group"));
    assert!(config_error("[dispatch]\nthread_group = [0, 1, 1]\n").contains("must be non-zero"));
    assert!(config_error("[dispatch]\nthread_group = [64, 64, 1]\n").contains("at most 1024 threads"));
    assert!(config_error("[dispatch]\nthread_group = [4294967295, 2, 1]\n").contains("at most 1024 threads"));
}

#[test]
fn test_error_names_the_file() {
    let err = CompilerConfig::parse("[compiler]\noptimization = 9\n", Path::new("/etc/kf.toml")).unwrap_err();
    assert!(err.to_string().contains("/etc/kf.toml"), "{}", err);
}

#[test]
fn test_load_and_discover() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE),
        "[compiler]\nprofile = \"cs_6_5\"\n[dispatch]\npool_capacity = 2\n",
    )
    .unwrap();

    let loaded = CompilerConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
    assert_eq!(loaded.profile, "cs_6_5");

    let discovered = CompilerConfig::discover(&nested).unwrap();
    assert_eq!(discovered.profile, "cs_6_5");
    assert_eq!(discovered.pool_capacity, 2);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = CompilerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    match err {
        Error::Config { message } => assert!(message.starts_with("cannot read config")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_dxc_override() {
    let config = CompilerConfig::default().with_dxc_override(Some("  /usr/local/bin/dxc "));
    assert_eq!(config.dxc_path, PathBuf::from("/usr/local/bin/dxc"));
    let config = CompilerConfig::default().with_dxc_override(Some("   "));
    assert_eq!(config.dxc_path, PathBuf::from("dxc"));
    let config = CompilerConfig::default().with_dxc_override(None);
    assert_eq!(config.dxc_path, PathBuf::from("dxc"));
}
