//! Loading of generator configuration files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use classify_engine::GeneratorConfig;

/// Load and parse a YAML generator config with environment variable substitution.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GeneratorConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read classify config from {:?}", path.as_ref()))?;

    let expanded = expand_env_vars(&content)?;

    let config: GeneratorConfig = serde_yaml::from_str(&expanded)
        .with_context(|| format!("Failed to parse classify config from {:?}", path.as_ref()))?;

    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}` references.
pub fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr))
    }
}

/// Check option ranges before any data is read.
pub fn validate_config(config: &GeneratorConfig) -> Result<()> {
    anyhow::ensure!(
        !config.expression.trim().is_empty(),
        "No z expression given (set `expression` or pass --expression)"
    );
    anyhow::ensure!(
        config.method.is_some(),
        "No classification method given (set `method` or pass --method/--levels)"
    );
    anyhow::ensure!(
        config.duplicate_tolerance >= 0.0 && config.duplicate_tolerance.is_finite(),
        "duplicate_tolerance must be a non-negative number, got {}",
        config.duplicate_tolerance
    );
    anyhow::ensure!(
        config.grid_tolerance > 0.0 && config.grid_tolerance < 0.5,
        "grid_tolerance must be between 0 and 0.5, got {}",
        config.grid_tolerance
    );
    anyhow::ensure!(
        (0.0..0.5).contains(&config.triangulation.min_circle_ratio),
        "triangulation.min_circle_ratio must be in [0, 0.5), got {}",
        config.triangulation.min_circle_ratio
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use classify_engine::{ClassifyMethod, ClassifyType};
    use std::io::Write;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("CLASSIFY_TEST_FIELD", "depth");
        let expanded = expand_env_vars("expression: ${CLASSIFY_TEST_FIELD}\nunits: ${CLASSIFY_TEST_UNSET:- m}\n").unwrap();
        assert_eq!(expanded, "expression: depth\nunits:  m\n");
    }

    #[test]
    fn test_expand_errors() {
        assert!(expand_env_vars("${CLASSIFY_TEST_DEFINITELY_UNSET}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "expression: elevation").unwrap();
        writeln!(file, "method: pretty").unwrap();
        writeln!(file, "params:\n  nClassify: 8").unwrap();
        writeln!(file, "classify_type: layer").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.expression, "elevation");
        assert_eq!(config.method, Some(ClassifyMethod::Pretty));
        assert_eq!(config.params.n_classify, Some(8));
        assert_eq!(config.classify_type, ClassifyType::Layer);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_validate_config() {
        let mut config = GeneratorConfig::default();
        assert!(validate_config(&config).is_err());

        config.expression = "z".to_string();
        config.method = Some(ClassifyMethod::Equal);
        validate_config(&config).unwrap();

        config.duplicate_tolerance = -1.0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate_tolerance"));
    }

    #[test]
    fn test_sample_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sample.yaml");
        let config = load_config(path).unwrap();
        assert_eq!(config.method, Some(ClassifyMethod::Pretty));
        assert_eq!(config.classify_type, ClassifyType::Filled);
        assert_eq!(config.labels.units, " m");
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/classify.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read classify config"));
    }
}
