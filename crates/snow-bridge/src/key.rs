//! Natural key for the service item an alert concerns.

/// Stand-in for an alert without a location.
pub const LOCATION_SENTINEL: &str = "_";

/// Location to use for key derivation, substituting the sentinel when empty.
#[must_use]
pub fn location_or_sentinel(location: &str) -> &str {
    if location.is_empty() {
        LOCATION_SENTINEL
    } else {
        location
    }
}

/// Build the natural key `platform_service_facet_status_location`.
///
/// `:` and `.` in the location become `_`. The other parts are joined as
/// they are, so an `_` inside them makes the key ambiguous.
#[must_use]
pub fn derive_key(
    platform: &str,
    service: &str,
    facet: &str,
    status: &str,
    location: &str,
) -> String {
    let location = location.replace([':', '.'], "_");
    format!("{platform}_{service}_{facet}_{status}_{location}")
}
