use orc_domain::config::Config;

#[test]
fn default_orchestrator_chain_length_is_five() {
    let config = Config::default();
    assert_eq!(config.orchestrator.max_chain_length, 5);
}

#[test]
fn explicit_overrides_parse_from_toml() {
    let toml_str = r#"
[orchestrator]
free_chat = true
max_chain_length = 9

[swarm]
max_retries = 7
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.orchestrator.free_chat);
    assert_eq!(config.orchestrator.max_chain_length, 9);
    assert_eq!(config.swarm.max_retries, 7);
    // Untouched sections still carry their own defaults.
    assert_eq!(config.message_queue.max_len, 5);
}
