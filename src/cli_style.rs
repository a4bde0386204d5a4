//! Colors of the `cli-auth` shell, for clap's help output and for the
//! user and role listings it prints.

use clap::builder::styling::{AnsiColor, Style};
use clap::builder::Styles;
use srms_server::user::{Permission, UserRole};
use std::fmt::Display;

const HEADING: Style = AnsiColor::Yellow.on_default().bold();
const COMMAND: Style = AnsiColor::Cyan.on_default().bold();
const FAILURE: Style = AnsiColor::Red.on_default().bold();
const MUTED: Style = AnsiColor::BrightBlack.on_default();

pub fn shell_styles() -> Styles {
    Styles::styled()
        .header(HEADING.underline())
        .usage(HEADING)
        .literal(COMMAND)
        .placeholder(MUTED)
        .valid(COMMAND)
        .invalid(FAILURE)
        .error(FAILURE)
}

fn paint(style: Style, text: impl Display) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Staff who move results along the approval chain share a color.
fn role_style(role: UserRole) -> Style {
    match role {
        UserRole::Student => AnsiColor::Blue.on_default(),
        UserRole::Lecturer | UserRole::Hod | UserRole::Dean | UserRole::ExamOfficer => {
            AnsiColor::Green.on_default().bold()
        }
        UserRole::Admin => AnsiColor::Magenta.on_default().bold(),
    }
}

pub fn heading(text: &str) -> String {
    paint(HEADING, text)
}

pub fn role_line(role: UserRole) -> String {
    format!("{} {}", heading("Role:"), paint(role_style(role), role))
}

pub fn permission_line(permission: Permission) -> String {
    format!("  {} {:?}", paint(MUTED, "-"), permission)
}

pub fn error_line(message: &str) -> String {
    format!("{} {}", paint(FAILURE, "Error:"), message)
}
