//! Configuration for Kindred
//!
//! CLI arguments with environment variable fallbacks. A `.env` file in the
//! working directory is loaded before parsing.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::images::ImageHostArgs;

/// Longest accepted reseed interval, in hours
pub const MAX_SCHEDULE_HOURS: u64 = 24 * 366;

/// Kindred - people directory with reciprocal relationships
#[derive(Parser, Debug, Clone)]
#[command(name = "kindred")]
#[command(about = "People directory service with reciprocal relationship propagation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (disables auth, MongoDB optional)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI (required outside dev mode)
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "kindred")]
    pub mongodb_db: String,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Allowed CORS origin (the dashboard URL)
    #[arg(long, env = "APP_URL_CLIENT")]
    pub app_url_client: Option<String>,

    /// Reseed interval in hours; unset disables the job
    #[arg(long, env = "SCHEDULE_HOUR")]
    pub schedule_hour: Option<u64>,

    /// JSON array of person records used by the reseed job
    #[arg(long, env = "RESEED_FILE")]
    pub reseed_file: Option<PathBuf>,

    /// Image hosting configuration
    #[command(flatten)]
    pub images: ImageHostArgs,
}

impl Args {
    /// Effective JWT secret; `None` in dev mode without an explicit secret
    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn cors_origin(&self) -> &str {
        self.app_url_client
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .unwrap_or("*")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret().is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.mongodb_uri.is_none() {
                return Err("MONGODB_URI is required in production mode".to_string());
            }
        }

        match self.schedule_hour {
            Some(0) => return Err("SCHEDULE_HOUR must be at least 1".to_string()),
            Some(h) if h > MAX_SCHEDULE_HOURS => {
                return Err(format!("SCHEDULE_HOUR must be at most {MAX_SCHEDULE_HOURS}"))
            }
            _ => {}
        }

        Ok(())
    }

    /// Dev-mode arguments for tests and embedding
    pub fn dev(listen: SocketAddr) -> Self {
        Self {
            listen,
            dev_mode: true,
            mongodb_uri: None,
            mongodb_db: "kindred".to_string(),
            jwt_secret: None,
            jwt_expiry_seconds: 3600,
            log_level: "info".to_string(),
            log_json: false,
            app_url_client: None,
            schedule_hour: None,
            reseed_file: None,
            images: ImageHostArgs::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["kindred"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_production_requires_secret_and_mongo() {
        let args = parse(&["--mongodb-uri", "mongodb://localhost:27017"]);
        if args.jwt_secret.is_none() {
            assert!(args.validate().is_err());
        }

        let args = parse(&[
            "--mongodb-uri",
            "mongodb://localhost:27017",
            "--jwt-secret",
            "0123456789abcdef0123456789abcdef",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_needs_nothing() {
        let args = Args::dev("127.0.0.1:0".parse().unwrap());
        assert!(args.validate().is_ok());
        assert_eq!(args.cors_origin(), "*");
    }

    #[test]
    fn test_zero_schedule_rejected() {
        let mut args = Args::dev("127.0.0.1:0".parse().unwrap());
        args.schedule_hour = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_schedule_beyond_a_year_rejected() {
        let mut args = Args::dev("127.0.0.1:0".parse().unwrap());
        args.schedule_hour = Some(MAX_SCHEDULE_HOURS);
        assert!(args.validate().is_ok());
        args.schedule_hour = Some(u64::MAX);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_cors_origin_trims_slash() {
        let mut args = Args::dev("127.0.0.1:0".parse().unwrap());
        args.app_url_client = Some("https://dash.example.org/".into());
        assert_eq!(args.cors_origin(), "https://dash.example.org");
    }
}
