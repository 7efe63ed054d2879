/// Runtime settings.
#[derive(Default)]
pub struct Settings {
    pub name: String,
}

impl Settings {
    pub fn with_name(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}
