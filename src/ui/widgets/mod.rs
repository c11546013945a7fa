// src/ui/widgets/mod.rs

pub mod analysis_view;
pub mod disclaimer_popup;
pub mod footer;
pub mod input;
pub mod log_view;
pub mod summary;

use ratatui::style::{Color, Style};
use stackguard_rs::core::models::Severity;

/// Colour used for a severity everywhere in the UI.
pub fn severity_style(severity: Severity) -> Style {
    let color = match severity {
        Severity::Critical => Color::Magenta,
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::Informational => Color::Blue,
        Severity::Unknown => Color::DarkGray,
    };
    Style::default().fg(color)
}
