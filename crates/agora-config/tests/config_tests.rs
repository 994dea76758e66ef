#[cfg(test)]
mod tests {
    use agora_config::ConfigLoader;
    use agora_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_agora_config_defaults() {
        let config = AgoraConfig::default();
        assert_eq!(config.engine.model, "openai/gpt-4o-mini");
        assert_eq!(config.engine.max_iterations, 3);
        assert_eq!(config.engine.llm_retries, 1);
        assert_eq!(config.engine.max_concurrent_cycles, 4);
    }

    #[test]
    fn test_heat_config_defaults() {
        let config = HeatConfig::default();
        assert_eq!(config.block_threshold, 80);
        assert_eq!(config.max_heat, 100);
        assert_eq!(config.decay_per_minute, 1.0);
        assert_eq!(config.cost_of("like"), 10);
        assert_eq!(config.cost_of("create_post"), 25);
        assert_eq!(config.cost_of("something_new"), config.default_cost);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert!(config.cron_secret.is_none());
        let keys: Vec<&str> = config.jobs.iter().map(|j| j.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["agent_cycle", "relationship_decay", "memory_cleanup", "token_budget_reset"]
        );
        assert_eq!(
            config.jobs[0].schedule(),
            Some(JobSchedule::Every { secs: 900 })
        );
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = AgoraConfig::default().validate().unwrap();
        assert!(warnings
            .iter()
            .all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_job_cron_wins_over_interval() {
        let job = JobConfig {
            key: "memory_cleanup".into(),
            every_secs: Some(60),
            cron: Some("0 0 * * * *".into()),
            enabled: true,
        };
        assert_eq!(
            job.schedule(),
            Some(JobSchedule::Cron {
                expression: "0 0 * * * *".into()
            })
        );
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = AgoraConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: AgoraConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.engine.model, config.engine.model);
        assert_eq!(restored.heat.block_threshold, config.heat.block_threshold);
        assert_eq!(restored.scheduler.jobs.len(), config.scheduler.jobs.len());
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[engine]
model = "openai/gpt-4o"

[heat.costs]
like = 3
"#;
        let config: AgoraConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.model, "openai/gpt-4o");
        assert_eq!(config.heat.cost_of("like"), 3);
        // A partial costs table replaces the default map.
        assert_eq!(config.heat.cost_of("comment"), config.heat.default_cost);
        assert_eq!(config.engine.max_tokens, 1024);
        assert_eq!(config.server.listen, "127.0.0.1:3710");
    }

    #[test]
    fn test_jobs_deserialize() {
        let toml_str = r#"
[[scheduler.jobs]]
key = "agent_cycle"
every_secs = 60

[[scheduler.jobs]]
key = "token_budget_reset"
cron = "0 0 0 * * *"
enabled = false
"#;
        let config: AgoraConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.jobs.len(), 2);
        assert!(config.scheduler.jobs[0].enabled);
        assert!(!config.scheduler.jobs[1].enabled);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = AgoraConfig::default();
        config.engine.max_iterations = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("engine.max_iterations"));
    }

    #[test]
    fn test_validate_rejects_more_than_one_model_retry() {
        let mut config = AgoraConfig::default();
        config.engine.llm_retries = 3;
        let err = config.validate().unwrap_err();
        assert!(err.contains("engine.llm_retries"));

        config.engine.llm_retries = 1;
        assert!(config.validate().is_ok());
        assert!(ConfigLoader::from_toml("[engine]\nllm_retries = 3\n").is_err());
    }

    #[test]
    fn test_validate_rejects_threshold_above_max() {
        let mut config = AgoraConfig::default();
        config.heat.block_threshold = 120;
        let err = config.validate().unwrap_err();
        assert!(err.contains("heat.block_threshold"));
    }

    #[test]
    fn test_validate_rejects_non_positive_decay() {
        let mut config = AgoraConfig::default();
        config.heat.decay_per_minute = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_cron() {
        let mut config = AgoraConfig::default();
        config.scheduler.jobs = vec![JobConfig::cron("memory_cleanup", "every tuesday")];
        let err = config.validate().unwrap_err();
        assert!(err.contains("invalid cron expression"));
    }

    #[test]
    fn test_validate_rejects_unknown_and_event_keys() {
        let mut config = AgoraConfig::default();
        config.scheduler.jobs = vec![JobConfig::every("battle_tick", 60)];
        assert!(config.validate().unwrap_err().contains("unknown job key"));

        config.scheduler.jobs = vec![JobConfig::every("agent_chat", 60)];
        assert!(config.validate().unwrap_err().contains("event-driven"));
    }

    #[test]
    fn test_validate_warns_on_unknown_log_format() {
        let mut config = AgoraConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agora.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[engine]
model = "openai/gpt-4o"
max_iterations = 5

[heat]
block_threshold = 60

[maintenance]
memory_retention_days = 7
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.engine.max_iterations, 5);
        assert_eq!(config.heat.block_threshold, 60);
        assert_eq!(config.maintenance.memory_retention_days, 7);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(loader.get().heat.max_heat, 100);
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agora.toml");
        std::fs::write(&config_path, "[engine]\nmax_iterations = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agora.toml");
        std::fs::write(&config_path, "[engine]\nmax_iterations = 2\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().engine.max_iterations, 2);

        std::fs::write(&config_path, "[engine]\nmax_iterations = 4\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().engine.max_iterations, 4);

        // An invalid edit keeps the previous config.
        std::fs::write(&config_path, "[engine]\nmax_iterations = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().engine.max_iterations, 4);
    }

    #[test]
    fn test_from_toml() {
        let config = ConfigLoader::from_toml("[budget]\ndaily_token_limit = 500\n").unwrap();
        assert_eq!(config.budget.daily_token_limit, 500);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = AgoraConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: AgoraConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.engine.model, config.engine.model);
    }
}
