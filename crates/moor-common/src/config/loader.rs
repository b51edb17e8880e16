use serde::Deserialize;

/// Deserialize a string configuration value, mapping the empty string to [`None`].
/// This allows optional values to be declared in the default configuration
/// and overridden through environment variables.
pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}
