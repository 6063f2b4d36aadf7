use anyhow::Result;
use console::style;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::TranscriptResponse;

/// Plain-text rendering: title, source URL, blank line, transcript
pub fn format_as_text(response: &TranscriptResponse, styled: bool) -> String {
    let title = if styled {
        style(&response.video_title).bold().to_string()
    } else {
        response.video_title.clone()
    };

    let transcript = if response.transcript.is_empty() {
        "(no speech detected)"
    } else {
        response.transcript.as_str()
    };

    format!("{}\n{}\n\n{}", title, response.url, transcript)
}

pub fn format_as_json(response: &TranscriptResponse) -> Result<String> {
    Ok(serde_json::to_string_pretty(response)?)
}

fn render(response: &TranscriptResponse, format: &OutputFormat, styled: bool) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(response, styled)),
        OutputFormat::Json => format_as_json(response),
    }
}

/// Save transcription result to file
pub async fn save_to_file(response: &TranscriptResponse, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(response, format, false)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcription result to console
pub fn print_to_console(response: &TranscriptResponse, format: &OutputFormat) -> Result<()> {
    let content = render(response, format, console::colors_enabled())?;
    println!("{}", content);
    Ok(())
}
