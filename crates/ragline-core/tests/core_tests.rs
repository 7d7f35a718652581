use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::{Figment, Jail};

use ragline_core::config::{resolve_with_base, Config, MissingEmbedding, SearchConfig, TieBreak};
use ragline_core::error::{BackendError, Error};
use ragline_core::similarity::{cosine_similarity, l2_normalize, mean, variance};
use ragline_core::types::{Query, Stage};

fn jail_config() -> Config {
    Config::from_figment(Figment::new().merge(Toml::file("config.toml")).merge(Env::prefixed("APP_").split("__")))
}

#[test]
fn search_config_defaults_when_section_absent() {
    Jail::expect_with(|_jail| {
        let cfg = jail_config().search().expect("defaults");
        assert_eq!(cfg, SearchConfig::default());
        assert_eq!(cfg.fusion.k, 60);
        assert_eq!(cfg.retrieval.timeout_ms, 500);
        assert!(cfg.stages.is_empty());
        Ok(())
    });
}

#[test]
fn search_config_merges_toml_and_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [search]
            stages = ["query_expansion", "rerank"]
            deadline_ms = 2500

            [search.diversity]
            lambda = 0.5
            missing_embedding = "exclude"

            [search.fusion]
            tie_break = "identifier"
            "#,
        )?;
        jail.set_env("APP_SEARCH__FUSION__K", "30");

        let cfg = jail_config().search().expect("search config");
        assert_eq!(cfg.stages, vec![Stage::QueryExpansion, Stage::Rerank]);
        assert_eq!(cfg.fusion.k, 30);
        assert_eq!(cfg.fusion.tie_break, TieBreak::Identifier);
        assert_eq!(cfg.diversity.missing_embedding, MissingEmbedding::Exclude);
        assert!((cfg.diversity.lambda - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.deadline().map(|d| d.as_millis()), Some(2500));
        // untouched sections keep their defaults
        assert_eq!(cfg.rerank.top_n, 10);
        assert!(cfg.enabled(Stage::Fusion));
        assert!(!cfg.enabled(Stage::Compression));
        Ok(())
    });
}

#[test]
fn search_config_rejects_unknown_keys() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[search.fusion]\nkk = 3\n")?;
        assert!(matches!(jail_config().search(), Err(Error::InvalidConfig(_))));
        Ok(())
    });
}

#[test]
fn validate_rejects_out_of_range_values() {
    let mut cfg = SearchConfig::default();
    cfg.diversity.lambda = 1.5;
    assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

    let mut cfg = SearchConfig::default();
    cfg.diversity.lambda = f32::NAN;
    assert!(cfg.validate().is_err());

    let mut cfg = SearchConfig::default();
    cfg.retrieval.top_k = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = SearchConfig::default();
    cfg.fusion.k = 0;
    assert!(cfg.validate().is_err());

    let cfg = SearchConfig::default().with_stages([Stage::Rerank, Stage::Rerank]);
    assert!(cfg.validate().is_err(), "duplicate stage");

    let cfg = SearchConfig::default().with_stages([Stage::Fusion]);
    assert!(cfg.validate().is_err(), "mandatory stage in list");

    let cfg = SearchConfig::default().with_stages([Stage::Compression, Stage::Rerank]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn backend_paths_resolve_against_base() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[backends]\ntantivy_index_dir = \"idx/tantivy\"\nlancedb_uri = \"/srv/lance\"\n")?;
        let backends = jail_config().backends().expect("backends");
        let base = Path::new("/data");
        assert_eq!(backends.tantivy_index_path(base), Path::new("/data/idx/tantivy"));
        assert_eq!(backends.lancedb_path(base), Path::new("/srv/lance"));
        assert_eq!(backends.chunk_table, "chunks");
        Ok(())
    });
}

#[test]
fn resolve_expands_env_vars() {
    Jail::expect_with(|jail| {
        jail.set_env("RAGLINE_TEST_DIR", "nested");
        assert_eq!(resolve_with_base(Path::new("/base"), "$RAGLINE_TEST_DIR/x"), Path::new("/base/nested/x"));
        Ok(())
    });
}

#[test]
fn cosine_handles_degenerate_inputs() {
    assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0, "dimension mismatch");
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
}

#[test]
fn normalize_mean_and_variance() {
    let mut v = vec![3.0f32, 4.0];
    l2_normalize(&mut v);
    assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

    let mut zero = vec![0.0f32; 3];
    l2_normalize(&mut zero);
    assert_eq!(zero, vec![0.0; 3]);

    assert_eq!(mean(&[]), None);
    assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    let var = variance(&[1.0, 2.0, 3.0]).expect("variance");
    assert!((var - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(variance(&[5.0, 5.0]), Some(0.0));
}

#[test]
fn query_variants_always_start_with_original() {
    let q = Query::new("what is lazy loading").with_filter("category", "/web");
    assert_eq!(q.variants(), ["what is lazy loading".to_string()]);
    let expanded = q.with_expansions(vec!["define lazy loading".to_string()]);
    assert_eq!(expanded.variants().len(), 2);
    assert_eq!(expanded.variants()[0], q.text());
    assert_eq!(expanded.filters().get("category").map(String::as_str), Some("/web"));
    // the source query is untouched
    assert_eq!(q.variants().len(), 1);
}

#[test]
fn only_transient_backend_errors_are_retryable() {
    assert!(BackendError::Unavailable("down".into()).is_retryable());
    assert!(BackendError::Timeout(std::time::Duration::from_millis(5)).is_retryable());
    assert!(!BackendError::Malformed("bad".into()).is_retryable());
    assert!(!BackendError::RateLimited("slow down".into()).is_retryable());
}
