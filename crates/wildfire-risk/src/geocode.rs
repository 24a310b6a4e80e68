//! Reverse geocoding: convert coordinates to a human-readable place name.
//! Uses Nominatim (OpenStreetMap) by default; free, no API key required.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::types::Coordinate;

const REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Reverse geocode coordinates to a place name (e.g. "Aviemore, Scotland").
/// Returns `None` on failure or timeout; the caller can go without a name.
pub async fn reverse_geocode(
    base_url: &str,
    user_agent: &str,
    coord: &Coordinate,
) -> Option<String> {
    let client = match Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(user_agent)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to create geocoding client: {}", e);
            return None;
        }
    };

    // zoom=10 resolves to town level; no point sending more precision than that
    let response = match client
        .get(base_url)
        .query(&[
            ("lat", format!("{:.3}", coord.latitude)),
            ("lon", format!("{:.3}", coord.longitude)),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("zoom", "10".to_string()),
        ])
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("Reverse geocode request failed: {}", e.without_url());
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::debug!("Reverse geocode returned status {}", response.status());
        return None;
    }

    let body: NominatimResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("Reverse geocode parse error: {}", e.without_url());
            return None;
        }
    };

    let name = place_name(body.address?);
    if let Some(name) = &name {
        tracing::info!("Reverse geocoded {} to: {}", coord.redacted(), name);
    }
    name
}

fn place_name(addr: NominatimAddress) -> Option<String> {
    let state = addr.state.clone();
    let country = addr.country.clone();

    // Prefer the most specific settlement name
    let place = addr
        .city
        .or(addr.town)
        .or(addr.village)
        .or(addr.hamlet)
        .or(addr.municipality)
        .or(addr.county)
        .or(addr.state)
        .or(addr.country)?;

    let suffix = state
        .filter(|s| !s.is_empty() && *s != place)
        .or_else(|| country.filter(|c| !c.is_empty() && *c != place));

    Some(match suffix {
        Some(s) => format!("{}, {}", place, s),
        None => place,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(json: &str) -> NominatimAddress {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_town_with_state() {
        let name = place_name(address(
            r#"{"town":"Aviemore","state":"Scotland","country":"United Kingdom"}"#,
        ));
        assert_eq!(name.as_deref(), Some("Aviemore, Scotland"));
    }

    #[test]
    fn test_city_preferred_over_county() {
        let name = place_name(address(
            r#"{"city":"Edinburgh","county":"City of Edinburgh","state":"Scotland"}"#,
        ));
        assert_eq!(name.as_deref(), Some("Edinburgh, Scotland"));
    }

    #[test]
    fn test_falls_back_to_country_suffix() {
        let name = place_name(address(r#"{"village":"Gairloch","country":"United Kingdom"}"#));
        assert_eq!(name.as_deref(), Some("Gairloch, United Kingdom"));
    }

    #[test]
    fn test_no_duplicate_suffix() {
        let name = place_name(address(r#"{"state":"Scotland"}"#));
        assert_eq!(name.as_deref(), Some("Scotland"));
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(place_name(address("{}")), None);
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -p wildfire-risk -- --ignored
    async fn test_reverse_geocode_edinburgh() {
        let coord = Coordinate::new(55.9533, -3.1883).unwrap();
        let name = reverse_geocode(
            "https://nominatim.openstreetmap.org/reverse",
            "WildFire/0.1 (tests)",
            &coord,
        )
        .await;
        assert!(name.unwrap().to_lowercase().contains("edinburgh"));
    }
}
