use console::Style;

pub fn error_prefix() -> String {
    Style::new()
        .for_stderr()
        .red()
        .bold()
        .apply_to("error:")
        .to_string()
}

pub fn check_mark() -> String {
    Style::new().green().bold().apply_to("\u{2714}").to_string()
}

pub fn bold(s: &str) -> String {
    Style::new().bold().apply_to(s).to_string()
}
