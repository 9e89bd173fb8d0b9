use anyhow::{anyhow, bail, Context, Result};
use hashreact_core::Snowflake;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub(crate) const BOT_TOKEN_PROMPT: &str = "Please enter your Discord bot token: ";
pub(crate) const GUILD_ID_PROMPT: &str = "Please enter your server ID: ";

/// Reads one trimmed line from the terminal. Blocks the calling thread.
pub(crate) fn prompt_line(prompt: &str) -> Result<String> {
    let mut editor = DefaultEditor::new().context("failed to initialize interactive prompt")?;
    match editor.readline(prompt) {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => bail!("interactive input cancelled"),
        Err(error) => Err(anyhow!("failed to read interactive input: {error}")),
    }
}

pub(crate) fn parse_bot_token_input(raw: &str) -> Result<String> {
    let token = raw.trim();
    if token.is_empty() {
        bail!("invalid token provided: the discord bot token must not be empty");
    }
    Ok(token.to_string())
}

pub(crate) fn parse_guild_id_input(raw: &str) -> Result<Snowflake> {
    let trimmed = raw.trim();
    trimmed.parse::<Snowflake>().map_err(|error| {
        anyhow!("invalid server id format '{trimmed}': {error}; enter the numeric guild id")
    })
}
