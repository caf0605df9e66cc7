use dotenvy::dotenv;
use linksaver_core::config::RelaySettings;
use linksaver_transport_telegram::config::{BotSettings, TelegramSettings};
use linksaver_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting bot tokens
struct RedactionPatterns {
    url_token: Regex,
    bare_token: Regex,
    bot_prefixed: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url_token: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            bare_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            bot_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .url_token
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.bare_token.replace_all(&output, "[TELEGRAM_TOKEN]");
        self.bot_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length even when redaction changed it
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Patterns must exist before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Linksaver TG Bot...");

    let settings = init_settings();

    run_bot(settings).await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "linksaver_core=info,linksaver_transport_telegram=info,linksaver_telegram_bot=info,teloxide=info,reqwest=warn,hyper=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

/// Unwrap a settings section or stop the process with a logged reason
fn load_or_exit<T, E: std::fmt::Display>(section: &str, loaded: Result<T, E>) -> T {
    loaded.unwrap_or_else(|e| {
        error!(section, "Failed to load configuration: {}", e);
        std::process::exit(1);
    })
}

fn init_settings() -> Arc<BotSettings> {
    let relay = load_or_exit("relay", RelaySettings::new());
    let telegram = load_or_exit("telegram", TelegramSettings::new());

    info!(
        admin_id = relay.admin_id,
        channel = %relay.required_channel,
        quota = relay.rate_limit_count,
        window_secs = relay.rate_limit_window_secs,
        "Configuration loaded successfully."
    );
    Arc::new(BotSettings::new(relay, telegram))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_tokens() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let token = "1234567890:AAEhBP0av28ZZ9DYmXGLeJkk1ZxnXXJBmTw";

        let url = format!("POST https://api.telegram.org/bot{token}/sendMessage failed");
        let redacted = patterns.redact(&url);
        assert!(!redacted.contains(token));
        assert!(redacted.contains("[TELEGRAM_TOKEN]"));

        let bare = patterns.redact(&format!("token={token}"));
        assert_eq!(bare, "token=[TELEGRAM_TOKEN]");

        assert_eq!(patterns.redact("nothing secret"), "nothing secret");
        Ok(())
    }

    #[test]
    fn test_redacting_writer_reports_original_length() -> io::Result<()> {
        let patterns = Arc::new(
            RedactionPatterns::new().map_err(io::Error::other)?,
        );
        let mut writer = RedactingWriter::new(Vec::new(), patterns);
        let line = b"bot1234567890:secret-part\n";

        assert_eq!(writer.write(line)?, line.len());
        let written = String::from_utf8_lossy(&writer.inner).into_owned();
        assert_eq!(written, "bot1234567890:[TELEGRAM_TOKEN]\n");
        Ok(())
    }
}
