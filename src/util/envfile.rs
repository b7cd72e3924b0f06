use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Parse environment variables from a .env file in the current working directory, if present.
/// Returns a map of key/value pairs. Does not modify the process environment.
pub fn parse_env_file() -> Result<std::collections::HashMap<String, String>> {
    let path = Path::new(".env");
    let mut map = std::collections::HashMap::new();
    if !path.exists() {
        return Ok(map);
    }
    let content = fs::read_to_string(path)?;
    for (idx, line) in content.lines().enumerate() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        if let Some(eq) = s.find('=') {
            let key = s[..eq].trim();
            let mut val = s[eq + 1..].to_string();
            // Remove surrounding quotes if present
            if val.len() >= 2
                && ((val.starts_with('"') && val.ends_with('"'))
                    || (val.starts_with('\'') && val.ends_with('\'')))
            {
                val = val[1..val.len() - 1].to_string();
            }
            map.insert(key.to_string(), val);
        } else {
            eprintln!(
                "Warning: ignoring .env line {} without '=': {}",
                idx + 1,
                line
            );
        }
    }
    Ok(map)
}

/// Load `.env` from current working directory into process environment (non-destructive: does not override existing vars).
pub fn load_dotenv_if_present() -> Result<()> {
    if let Ok(map) = parse_env_file() {
        for (k, v) in map {
            if std::env::var_os(&k).is_none() {
                unsafe {
                    std::env::set_var(&k, &v);
                }
            }
        }
    }
    Ok(())
}

/// Generate a .env.template file with placeholder values and comments.
pub fn write_env_template(path: &str) -> Result<()> {
    let mut f = fs::File::create(path)?;
    let template = r#"# record_linker environment configuration template
# Copy this file to .env and fill in your database connection settings.
# Any of these variables can also be provided via the system environment.

# Database holding both source tables
DB_HOST=127.0.0.1
DB_PORT=3306
DB_USER=root
DB_PASSWORD=secret
DB_NAME=database_name

# Source tables (optional; can also be passed as CLI options)
#TABLE_A=persons_a
#TABLE_B=persons_b

# Connection pool (optional)
#RECORD_LINKER_POOL_SIZE=8
#RECORD_LINKER_POOL_MIN=2
#RECORD_LINKER_ACQUIRE_MS=30000
#RECORD_LINKER_IDLE_MS=30000
#RECORD_LINKER_LIFETIME_MS=600000

# Logging: set RECORD_LINKER_TRACING=1 to use the tracing subscriber
#RECORD_LINKER_TRACING=0
#RUST_LOG=info
"#;
    f.write_all(template.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_env_template() {
        let path = std::env::temp_dir().join(format!("rl_envtpl_{}.txt", std::process::id()));
        write_env_template(path.to_str().unwrap()).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("DB_HOST="));
        assert!(body.contains("RECORD_LINKER_POOL_SIZE"));
        let _ = fs::remove_file(&path);
    }
}
