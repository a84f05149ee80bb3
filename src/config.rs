use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engines: EnginesConfig,
    pub cache: CacheConfig,
    pub judge: JudgeConfig,
    pub breaker: BreakerConfig,
    pub orchestrator: OrchestratorConfig,
    pub lm: LanguageModelConfig,
    pub spam: SpamFilterConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// One section per search engine adapter.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EnginesConfig {
    pub brave: EngineConfig,
    pub serper: EngineConfig,
    pub searxng: EngineConfig,
    pub tavily: EngineConfig,
    pub perplexica: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { base_url: String::new(), api_key: None, enabled: false, timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached query lists before eviction kicks in.
    pub max_size: usize,
    /// Write-TTL for cached query lists.
    pub ttl_hours: i64,
}

/// Everything the metadata judge reads is configuration, not code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub confidence_threshold: f64,
    pub funding_keywords: Vec<String>,
    pub funding_saturation: u32,
    pub funding_weight: f64,
    pub geographic_keywords: Vec<String>,
    pub geographic_saturation: u32,
    pub geographic_weight: f64,
    pub organization_keywords: Vec<String>,
    pub organization_saturation: u32,
    pub organization_weight: f64,
    pub credibility_weight: f64,
    pub credible_tlds: Vec<String>,
    pub scam_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure ratio over the sliding window that trips the breaker.
    pub failure_ratio: f64,
    /// Number of calls tracked in the sliding window.
    pub window_size: usize,
    /// How long the breaker stays OPEN before admitting a probe.
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-batch deadline for the search fan-out.
    pub batch_deadline_secs: u64,
    /// Bounded concurrency for per-result candidate processing.
    pub max_concurrent_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LanguageModelConfig {
    /// OpenAI-compatible base URL, e.g. a local llama.cpp/Ollama server.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpamFilterConfig {
    /// Substring patterns matched against the URL host.
    pub blocked_host_patterns: Vec<String>,
    /// Markers matched against the URL path and title.
    pub spam_markers: Vec<String>,
    /// Known spam exemplars for fuzzy matching.
    pub known_spam_titles: Vec<String>,
    /// Levenshtein similarity at or above which a title counts as spam.
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Queries returned when the language model is unreachable.
    pub fallback_keyword_queries: Vec<String>,
    pub fallback_prompt_queries: Vec<String>,
    /// Category slug -> human phrasing used inside prompts.
    pub category_descriptions: HashMap<String, String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "northstar")]
#[command(version, about = "Northstar - Funding Source Discovery Pipeline")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,northstar=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Language model base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub lm_base_url: Option<String>,

    /// Language model name (overrides config file)
    #[arg(long, value_name = "MODEL")]
    pub lm_model: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_LOG_LEVEL
    /// - APP_LM_BASE_URL / APP_LM_MODEL
    /// - APP_ENGINE_<NAME>_BASE_URL / _API_KEY / _ENABLED for each engine
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(base_url) = std::env::var("APP_LM_BASE_URL") {
            self.lm.base_url = base_url;
            tracing::info!("Override lm.base_url from env: {}", self.lm.base_url);
        }

        if let Ok(model) = std::env::var("APP_LM_MODEL") {
            self.lm.model = model;
            tracing::info!("Override lm.model from env: {}", self.lm.model);
        }

        for (name, engine) in [
            ("BRAVE", &mut self.engines.brave),
            ("SERPER", &mut self.engines.serper),
            ("SEARXNG", &mut self.engines.searxng),
            ("TAVILY", &mut self.engines.tavily),
            ("PERPLEXICA", &mut self.engines.perplexica),
        ] {
            if let Ok(base_url) = std::env::var(format!("APP_ENGINE_{}_BASE_URL", name)) {
                engine.base_url = base_url;
                tracing::info!("Override engines.{}.base_url from env", name.to_lowercase());
            }
            if let Ok(api_key) = std::env::var(format!("APP_ENGINE_{}_API_KEY", name)) {
                engine.api_key = Some(api_key);
                tracing::info!("Override engines.{}.api_key from env", name.to_lowercase());
            }
            if let Ok(enabled) = std::env::var(format!("APP_ENGINE_{}_ENABLED", name))
                && let Ok(enabled) = enabled.parse()
            {
                engine.enabled = enabled;
                tracing::info!(
                    "Override engines.{}.enabled from env: {}",
                    name.to_lowercase(),
                    enabled
                );
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(base_url) = &args.lm_base_url {
            self.lm.base_url = base_url.clone();
            tracing::info!("Override lm.base_url from CLI: {}", self.lm.base_url);
        }

        if let Some(model) = &args.lm_model {
            self.lm.model = model.clone();
            tracing::info!("Override lm.model from CLI: {}", self.lm.model);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if !(0.0..=1.0).contains(&self.judge.confidence_threshold) {
            anyhow::bail!("judge.confidence_threshold must be within [0.0, 1.0]");
        }

        if !(0.0..=1.0).contains(&self.breaker.failure_ratio) || self.breaker.failure_ratio == 0.0 {
            anyhow::bail!("breaker.failure_ratio must be within (0.0, 1.0]");
        }

        if self.breaker.window_size == 0 {
            anyhow::bail!("breaker.window_size must be > 0");
        }

        if self.cache.max_size == 0 {
            anyhow::bail!("cache.max_size must be > 0");
        }

        if self.orchestrator.batch_deadline_secs == 0 {
            anyhow::bail!("orchestrator.batch_deadline_secs must be > 0");
        }

        if self.orchestrator.max_concurrent_results == 0 {
            anyhow::bail!("orchestrator.max_concurrent_results must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/northstar.db".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,northstar=debug".to_string(),
            file: Some("logs/northstar.log".to_string()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 500, ttl_hours: 24 }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            funding_keywords: to_strings(&[
                "grant",
                "grants",
                "funding",
                "scholarship",
                "scholarships",
                "fellowship",
                "fellowships",
                "bursary",
                "stipend",
                "endowment",
                "donation",
                "financial support",
                "award",
                "program fund",
            ]),
            funding_saturation: 3,
            funding_weight: 2.0,
            geographic_keywords: to_strings(&[
                "bulgaria",
                "bulgarian",
                "sofia",
                "balkan",
                "eastern europe",
                "southeast europe",
            ]),
            geographic_saturation: 2,
            geographic_weight: 1.0,
            organization_keywords: to_strings(&[
                "foundation",
                "ngo",
                "nonprofit",
                "non-profit",
                "charity",
                "trust",
                "institute",
                "association",
                "fellowship",
                "fund",
            ]),
            organization_saturation: 2,
            organization_weight: 0.8,
            credibility_weight: 1.5,
            credible_tlds: to_strings(&["gov", "edu", "org", "eu", "int"]),
            scam_patterns: to_strings(&[
                "free-money",
                "easy-cash",
                "get-rich",
                "lottery",
                "casino",
                "prize-claim",
            ]),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_ratio: 0.5, window_size: 10, cooldown_secs: 30 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { batch_deadline_secs: 10, max_concurrent_results: 8 }
    }
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            timeout_secs: 30,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl Default for SpamFilterConfig {
    fn default() -> Self {
        Self {
            blocked_host_patterns: to_strings(&[
                "doubleclick",
                "adservice",
                "clicktrack",
                "click.promo",
                "redirect.",
                "linkjuice",
            ]),
            spam_markers: to_strings(&[
                "click now",
                "!!!",
                "100% free",
                "you won",
                "hot deal",
                "casino",
                "limited offer",
            ]),
            known_spam_titles: to_strings(&[
                "Congratulations you have been selected",
                "Claim your free grant money today",
                "Government grants nobody tells you about",
            ]),
            similarity_threshold: 0.92,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let mut category_descriptions = HashMap::new();
        for (slug, description) in [
            ("education", "education and training programs"),
            ("arts_culture", "arts and culture initiatives"),
            ("healthcare", "healthcare and public health projects"),
            ("social_services", "social services and welfare programs"),
            ("environment", "environmental protection projects"),
            ("research", "scientific research"),
            ("community_development", "community development initiatives"),
            ("youth_development", "youth development programs"),
        ] {
            category_descriptions.insert(slug.to_string(), description.to_string());
        }

        Self {
            fallback_keyword_queries: to_strings(&[
                "bulgaria education grants foundation",
                "bulgarian nonprofit funding program",
                "scholarships bulgarian students",
                "eastern europe community grants",
                "bulgaria research fellowship",
            ]),
            fallback_prompt_queries: to_strings(&[
                "Which foundations currently offer grants for education projects in Bulgaria?",
                "What funding programs support Bulgarian nonprofit organizations this year?",
                "Which fellowships are open to researchers based in Bulgaria?",
            ]),
            category_descriptions,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
