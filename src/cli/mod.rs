//! Offline command line for the GUI action parser.

use std::io::Read;

use clap::{Parser, Subcommand};

use crate::action_parser::{
    extract_action, ActionParser, ActionParserConfig, GrammarMode, ModelVersion, ScreenContext,
};
use crate::config::parse_factors;
use crate::error::TarkoError;

/// Tarko action parser CLI
#[derive(Parser, Debug)]
#[command(name = "tarko", version, about = "Parse GUI agent responses into actions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a model response into normalized actions (JSON)
    Parse(ParseArgs),
    /// Print the action body located by the `Action:` marker scanner
    Extract(ExtractArgs),
}

/// Arguments for `tarko parse`.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Coordinate factors as `<width>,<height>`
    #[arg(long, default_value = "1000,1000")]
    pub factors: String,

    /// Response grammar (bc or o1)
    #[arg(long, default_value = "bc")]
    pub mode: GrammarMode,

    /// Model coordinate convention (v1.0 or v1.5)
    #[arg(long, default_value = "v1.0")]
    pub model_version: ModelVersion,

    /// Screenshot size as `<width>x<height>`
    #[arg(long)]
    pub screen: Option<String>,

    /// Device pixel ratio applied to pixel coordinates
    #[arg(long, default_value_t = 1.0)]
    pub scale_factor: f64,

    /// Locate the action with the `Action:` marker scanner
    #[arg(long)]
    pub marker: bool,

    /// Response text (read from stdin when omitted)
    pub text: Option<String>,
}

/// Arguments for `tarko extract`.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Response text (read from stdin when omitted)
    pub text: Option<String>,
}

/// Execute a command and return its JSON output.
pub fn run(command: Commands) -> Result<String, TarkoError> {
    match command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Extract(args) => handle_extract(args),
    }
}

fn handle_parse(args: ParseArgs) -> Result<String, TarkoError> {
    let text = input_text(args.text)?;
    let config = ActionParserConfig {
        factors: parse_factors(&args.factors)?,
        mode: args.mode,
        model_version: args.model_version,
        scale_factor: args.scale_factor,
        ..ActionParserConfig::default()
    };
    let screen = args.screen.as_deref().map(parse_screen).transpose()?;
    let parser = ActionParser::new(config);
    let actions = if args.marker {
        parser.parse_marked(&text, screen)
    } else {
        parser.parse(&text, screen)
    };
    Ok(serde_json::to_string_pretty(&actions)?)
}

fn handle_extract(args: ExtractArgs) -> Result<String, TarkoError> {
    let text = input_text(args.text)?;
    let extracted = extract_action(&text);
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "preamble": extracted.preamble,
        "action": extracted.body,
    }))?)
}

fn input_text(text: Option<String>) -> Result<String, TarkoError> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// `"1920x1080"` into a screen context.
pub fn parse_screen(value: &str) -> Result<ScreenContext, TarkoError> {
    let invalid = || TarkoError::InvalidArgument(format!("screen must be <width>x<height>, got {value:?}"));
    let (width, height) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    Ok(ScreenContext::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_prints_actions() {
        let cli = Cli::try_parse_from([
            "tarko",
            "parse",
            "--screen",
            "1000x800",
            "Thought: go\nAction: click(start_box='(500,500)')",
        ])
        .unwrap();
        let output = run(cli.command).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["action_type"], "click");
        assert_eq!(value[0]["action_inputs"]["start_coords"], serde_json::json!([500.0, 400.0]));
    }

    #[test]
    fn extract_command_prints_body() {
        let cli = Cli::try_parse_from([
            "tarko",
            "extract",
            "I can't see it\nAction: scroll(direction='down')",
        ])
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&run(cli.command).unwrap()).unwrap();
        assert_eq!(value["action"], "scroll(direction='down')");
    }

    #[test]
    fn screen_flag_is_validated() {
        assert_eq!(parse_screen("1920x1080").unwrap(), ScreenContext::new(1920, 1080));
        assert!(parse_screen("wide").is_err());
    }

    #[test]
    fn mode_flag_uses_lowercase_names() {
        let cli = Cli::try_parse_from(["tarko", "parse", "--mode", "o1", "--model-version", "v1.5", "x"])
            .unwrap();
        match cli.command {
            Commands::Parse(args) => {
                assert_eq!(args.mode, GrammarMode::O1);
                assert_eq!(args.model_version, ModelVersion::V1_5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
