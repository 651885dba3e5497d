//! Dialoguer theme and banner for interactive mode.

use console::{style, Style};
use dialoguer::theme::ColorfulTheme;

/// `ColorfulTheme` in Glimpse colors: magenta prompts, green results.
pub fn glimpse_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("?".to_string()).for_stderr().magenta(),
        prompt_style: Style::new().for_stderr().bold(),
        prompt_suffix: style("›".to_string()).for_stderr().bright().black(),
        active_item_prefix: style("▸".to_string()).for_stderr().magenta(),
        active_item_style: Style::new().for_stderr().magenta(),
        success_prefix: style("✓".to_string()).for_stderr().green(),
        success_suffix: style("·".to_string()).for_stderr().bright().black(),
        error_prefix: style("✗".to_string()).for_stderr().red(),
        error_style: Style::new().for_stderr().red(),
        values_style: Style::new().for_stderr().green(),
        ..ColorfulTheme::default()
    }
}

/// Banner for the interactive entry screen, on stderr.
pub fn print_banner(model_name: &str) {
    let lines = [
        format!("Glimpse v{}", glimpse_core::VERSION),
        "Image captioning".to_string(),
        model_name.to_string(),
    ];
    let inner_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    let magenta = Style::new().for_stderr().magenta();

    eprintln!();
    eprintln!("{}", magenta.apply_to(format!("  ╔{:═<inner_width$}╗", "")));
    for line in &lines {
        eprintln!("{}", magenta.apply_to(format!("  ║{line:^inner_width$}║")));
    }
    eprintln!("{}", magenta.apply_to(format!("  ╚{:═<inner_width$}╝", "")));
    eprintln!();
}
