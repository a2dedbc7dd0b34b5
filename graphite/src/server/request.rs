//! Render request parameters.

/// Parameters of a `/render` request.
///
/// Built from raw key/value pairs so that repeated `target` keys survive.
#[derive(Debug, Default, PartialEq)]
pub struct RenderParams {
    pub targets: Vec<String>,
    pub from: Option<String>,
    pub until: Option<String>,
}

impl RenderParams {
    pub const DEFAULT_FROM: &'static str = "-1d";
    pub const DEFAULT_UNTIL: &'static str = "now";

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "target" | "target[]" if !value.is_empty() => params.targets.push(value),
                "from" => params.from = Some(value),
                "until" => params.until = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn from_param(&self) -> &str {
        self.from.as_deref().unwrap_or(Self::DEFAULT_FROM)
    }

    pub fn until_param(&self) -> &str {
        self.until.as_deref().unwrap_or(Self::DEFAULT_UNTIL)
    }
}
