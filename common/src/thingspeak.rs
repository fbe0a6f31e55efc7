//! ThingSpeak channel update API.

pub const DEFAULT_API_BASE: &str = "https://api.thingspeak.com";

pub fn update_url(api_base: &str, key: &str, field1: i32, field2: i32) -> String {
    format!(
        "{}/update?api_key={}&field1={}&field2={}",
        api_base.trim_end_matches('/'),
        key,
        field1,
        field2
    )
}

/// The update endpoint answers with the new entry id; `0` means the update
/// was dropped (rate limit or bad key) even though the status is 200.
pub fn entry_id(body: &str) -> Option<u64> {
    body.trim().parse::<u64>().ok().filter(|id| *id > 0)
}
