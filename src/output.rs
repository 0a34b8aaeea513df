use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `CFGSYNC_QUIET=1` (or `true`) suppresses human-oriented output
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| quiet_from(std::env::var("CFGSYNC_QUIET").ok().as_deref()))
}

fn quiet_from(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
