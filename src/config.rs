//! Configuration types
//!
//! Everything is read from `ONBOARDING_*` environment variables; every
//! default is a named constant below.

use crate::state_machine::VoiceSubmitPolicy;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
/// How long `Speaking` lasts when the synthesizer can't say when it's done
pub const DEFAULT_SPEAKING_FALLBACK: Duration = Duration::from_millis(2000);
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Sessions nobody has touched for this long are ended
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Delay before the scripted responder answers
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_GREETING: &str = "Welcome to ProfitWise! I'm here to help you get started. \
    You can speak to me or type your responses.";
pub const DEFAULT_SCRIPTED_REPLY: &str =
    "Thank you for your response. Let me help you with that...";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the ProfitWise onboarding assistant. \
    Greet new users warmly, learn about their business one question at a time, \
    and keep every reply to two or three short spoken sentences.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Settings applied to every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub voice_submit: VoiceSubmitPolicy,
    pub speaking_fallback: Duration,
    pub generation_timeout: Duration,
    pub idle_timeout: Duration,
    pub greeting: String,
    pub error_notice: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            voice_submit: VoiceSubmitPolicy::default(),
            speaking_fallback: DEFAULT_SPEAKING_FALLBACK,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            greeting: DEFAULT_GREETING.to_string(),
            error_notice: crate::state_machine::state::DEFAULT_ERROR_NOTICE.to_string(),
        }
    }
}

/// Which reply backend to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderConfig {
    /// Canned reply after a fixed delay
    Scripted { reply: String, delay: Duration },
    /// `OpenAI`-compatible chat/completions endpoint
    ChatCompletions {
        url: String,
        api_key: Option<String>,
        model: String,
        system_prompt: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub session: SessionSettings,
    pub responder: ResponderConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or("ONBOARDING_PORT", &get, "a port number", DEFAULT_PORT)?;

        let voice_submit = match get("ONBOARDING_VOICE_SUBMIT").as_deref() {
            None | Some("confirm") => VoiceSubmitPolicy::Confirm,
            Some("auto") => VoiceSubmitPolicy::Auto,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "ONBOARDING_VOICE_SUBMIT",
                    expected: "\"confirm\" or \"auto\"",
                    value: other.to_string(),
                })
            }
        };

        let session = SessionSettings {
            voice_submit,
            speaking_fallback: millis_or(
                "ONBOARDING_SPEAKING_FALLBACK_MS",
                &get,
                DEFAULT_SPEAKING_FALLBACK,
            )?,
            generation_timeout: millis_or(
                "ONBOARDING_GENERATION_TIMEOUT_MS",
                &get,
                DEFAULT_GENERATION_TIMEOUT,
            )?,
            idle_timeout: millis_or(
                "ONBOARDING_SESSION_IDLE_TIMEOUT_MS",
                &get,
                DEFAULT_SESSION_IDLE_TIMEOUT,
            )?,
            greeting: get("ONBOARDING_GREETING").unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            error_notice: get("ONBOARDING_ERROR_NOTICE").unwrap_or_else(|| {
                crate::state_machine::state::DEFAULT_ERROR_NOTICE.to_string()
            }),
        };

        let responder = match get("ONBOARDING_LLM_URL") {
            Some(url) => ResponderConfig::ChatCompletions {
                url,
                api_key: get("ONBOARDING_LLM_API_KEY"),
                model: get("ONBOARDING_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                system_prompt: get("ONBOARDING_SYSTEM_PROMPT")
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            },
            None => ResponderConfig::Scripted {
                reply: DEFAULT_SCRIPTED_REPLY.to_string(),
                delay: millis_or("ONBOARDING_REPLY_DELAY_MS", &get, DEFAULT_REPLY_DELAY)?,
            },
        };

        Ok(Self {
            port,
            session,
            responder,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    get: &impl Fn(&str) -> Option<String>,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}

fn millis_or(
    var: &'static str,
    get: &impl Fn(&str) -> Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => parse_or(var, get, "a duration in milliseconds", 0u64)
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid {
                var,
                expected: "a duration in milliseconds",
                value,
            }),
    }
}
