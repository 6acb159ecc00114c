// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server discovery: FindServers and GetEndpoints.
//!
//! `find_servers` filters the returned application descriptions against the
//! configured application-type mask, the requested server URIs and locale
//! ids, and a set of structural checks on the application URI. Rejected
//! descriptions are dropped silently; the surviving set is returned directly
//! to the caller rather than through the receive queue.

use crate::error::{AdapterResult, DiscoveryError};
use crate::transport::{ApplicationDescription, ServerDevice, UaStack};
use crate::types::ApplicationTypeMask;

/// Minimum length of a valid application URI.
const MIN_APPLICATION_URI_LEN: usize = 5;

// =============================================================================
// FindServers
// =============================================================================

/// Issues FindServers and returns the descriptions that pass validation.
pub async fn find_servers(
    stack: &dyn UaStack,
    url: &str,
    supported_types: ApplicationTypeMask,
    server_uris: &[String],
    locale_ids: &[String],
) -> AdapterResult<Vec<ApplicationDescription>> {
    let descriptions = stack
        .find_servers(url)
        .await
        .map_err(|status| DiscoveryError::find_servers_failed(url, status))?;

    let total = descriptions.len();
    let accepted: Vec<ApplicationDescription> = descriptions
        .into_iter()
        .filter(|desc| {
            validate_application_description(stack, desc, supported_types, server_uris, locale_ids)
        })
        .collect();

    tracing::debug!(
        url = url,
        received = total,
        accepted = accepted.len(),
        "FindServers completed"
    );
    Ok(accepted)
}

/// Validates one application description against the discovery filters.
///
/// Returns `false` when the description must be filtered out.
pub fn validate_application_description(
    stack: &dyn UaStack,
    desc: &ApplicationDescription,
    supported_types: ApplicationTypeMask,
    server_uris: &[String],
    locale_ids: &[String],
) -> bool {
    if !supported_types.accepts(desc.application_type) {
        tracing::debug!(uri = %desc.application_uri, "application type not supported");
        return false;
    }

    let uri = &desc.application_uri;
    if uri.len() < MIN_APPLICATION_URI_LEN {
        tracing::debug!(uri = %uri, "application URI too short");
        return false;
    }

    // URIs that are not URNs are assumed to be endpoint URLs.
    if !uri.starts_with("urn:") {
        let parsed = match stack.parse_endpoint_url(uri) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(uri = %uri, error = %e, "application URI is not a valid endpoint URL");
                return false;
            }
        };
        if parsed.host.is_empty() {
            tracing::debug!(uri = %uri, "application URI has an empty host");
            return false;
        }
        if parsed.host.starts_with(|c: char| c.is_ascii_digit())
            && !is_valid_ipv4_address(&parsed.host)
        {
            tracing::debug!(uri = %uri, host = %parsed.host, "invalid IPv4 host in application URI");
            return false;
        }
    }

    if !server_uris.is_empty() && !server_uris.iter().any(|u| u == uri) {
        tracing::debug!(uri = %uri, "application URI not in the requested server URI list");
        return false;
    }

    if !locale_ids.is_empty() {
        let locale = &desc.application_name_locale;
        if locale.is_empty() || !locale_ids.iter().any(|l| l == locale) {
            tracing::debug!(uri = %uri, locale = %locale, "application name locale not requested");
            return false;
        }
    }

    true
}

/// Checks that a host is a syntactically valid dotted-quad IPv4 address:
/// four segments of 1-3 decimal digits, each at most 255.
fn is_valid_ipv4_address(host: &str) -> bool {
    let mut segments = 0;
    for segment in host.split('.') {
        segments += 1;
        if segments > 4 {
            return false;
        }
        if segment.is_empty() || segment.len() > 3 {
            return false;
        }
        if !segment.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        // At most 3 digits, cannot overflow u32.
        let value: u32 = match segment.parse() {
            Ok(v) => v,
            Err(_) => return false,
        };
        if value > 255 {
            return false;
        }
    }
    segments == 4
}

// =============================================================================
// GetEndpoints
// =============================================================================

/// Issues GetEndpoints and wraps the result into a [`ServerDevice`].
pub async fn get_endpoints(stack: &dyn UaStack, url: &str) -> AdapterResult<ServerDevice> {
    let parsed = stack.parse_endpoint_url(url)?;
    let endpoints = stack
        .get_endpoints(url)
        .await
        .map_err(|status| DiscoveryError::get_endpoints_failed(url, status))?;

    let server_name = endpoints
        .first()
        .map(|ep| ep.server.application_name.clone())
        .unwrap_or_default();

    tracing::debug!(url = url, endpoints = endpoints.len(), "GetEndpoints completed");

    Ok(ServerDevice {
        address: parsed.host,
        port: parsed.port,
        server_name,
        endpoints,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdapterError, ConnectionError};
    use crate::transport::{EndpointDescription, ParsedEndpoint, ServiceResult, UaSession};
    use crate::types::ApplicationType;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ParserStack;

    #[async_trait]
    impl UaStack for ParserStack {
        fn parse_endpoint_url(&self, url: &str) -> AdapterResult<ParsedEndpoint> {
            let rest = url.strip_prefix("opc.tcp://").ok_or_else(|| {
                AdapterError::connection(ConnectionError::invalid_endpoint(url, "bad scheme"))
            })?;
            let (host, port) = rest.split_once(':').unwrap_or((rest, "4840"));
            Ok(ParsedEndpoint {
                host: host.to_string(),
                port: port.trim_end_matches('/').parse().unwrap_or(4840),
                path: String::new(),
            })
        }

        async fn connect(&self, url: &str) -> AdapterResult<Arc<dyn UaSession>> {
            Err(AdapterError::connection(ConnectionError::connect_failed(
                url, "not implemented",
            )))
        }

        async fn find_servers(&self, _url: &str) -> ServiceResult<Vec<ApplicationDescription>> {
            Ok(Vec::new())
        }

        async fn get_endpoints(&self, _url: &str) -> ServiceResult<Vec<EndpointDescription>> {
            Ok(Vec::new())
        }
    }

    fn description(uri: &str) -> ApplicationDescription {
        ApplicationDescription {
            application_uri: uri.to_string(),
            product_uri: "urn:test:product".to_string(),
            application_name: "Test Server".to_string(),
            application_name_locale: "en-US".to_string(),
            application_type: ApplicationType::Server,
            gateway_server_uri: String::new(),
            discovery_profile_uri: String::new(),
            discovery_urls: vec!["opc.tcp://localhost:4840".to_string()],
        }
    }

    fn validate(
        desc: &ApplicationDescription,
        server_uris: &[String],
        locale_ids: &[String],
    ) -> bool {
        validate_application_description(
            &ParserStack,
            desc,
            ApplicationTypeMask::ALL,
            server_uris,
            locale_ids,
        )
    }

    #[test]
    fn test_accepts_urn_uri() {
        assert!(validate(&description("urn:test:server"), &[], &[]));
    }

    #[test]
    fn test_rejects_short_uri() {
        assert!(!validate(&description("urn:"), &[], &[]));
        assert!(!validate(&description(""), &[], &[]));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let desc = description("urn:test:server");
        let mask = ApplicationTypeMask(ApplicationTypeMask::CLIENT);
        assert!(!validate_application_description(
            &ParserStack,
            &desc,
            mask,
            &[],
            &[]
        ));
    }

    #[test]
    fn test_endpoint_url_uri_with_hostname() {
        assert!(validate(&description("opc.tcp://factory7:4840"), &[], &[]));
    }

    #[test]
    fn test_endpoint_url_uri_with_ipv4() {
        assert!(validate(&description("opc.tcp://192.168.0.10:4840"), &[], &[]));
        assert!(!validate(&description("opc.tcp://192.168.0.999:4840"), &[], &[]));
        assert!(!validate(&description("opc.tcp://192.168.0:4840"), &[], &[]));
    }

    #[test]
    fn test_server_uri_filter() {
        let desc = description("urn:test:server");
        let uris = vec!["urn:test:server".to_string()];
        assert!(validate(&desc, &uris, &[]));

        let uris = vec!["urn:test:other".to_string()];
        assert!(!validate(&desc, &uris, &[]));

        // Prefix is not equality.
        let uris = vec!["urn:test:server:extra".to_string()];
        assert!(!validate(&desc, &uris, &[]));
    }

    #[test]
    fn test_locale_filter() {
        let desc = description("urn:test:server");
        let locales = vec!["en-US".to_string()];
        assert!(validate(&desc, &[], &locales));

        let locales = vec!["ko-KR".to_string()];
        assert!(!validate(&desc, &[], &locales));

        let mut desc = desc;
        desc.application_name_locale = String::new();
        let locales = vec!["en-US".to_string()];
        assert!(!validate(&desc, &[], &locales));
    }

    #[test]
    fn test_ipv4_validation() {
        assert!(is_valid_ipv4_address("0.0.0.0"));
        assert!(is_valid_ipv4_address("255.255.255.255"));
        assert!(is_valid_ipv4_address("10.0.0.1"));

        assert!(!is_valid_ipv4_address("256.0.0.1"));
        assert!(!is_valid_ipv4_address("1.2.3"));
        assert!(!is_valid_ipv4_address("1.2.3.4.5"));
        assert!(!is_valid_ipv4_address("1..2.3"));
        assert!(!is_valid_ipv4_address("1.2.3.a"));
        assert!(!is_valid_ipv4_address("1234.2.3.4"));
        assert!(!is_valid_ipv4_address(""));
    }

    #[tokio::test]
    async fn test_get_endpoints_device() {
        let device = get_endpoints(&ParserStack, "opc.tcp://plc7:4840")
            .await
            .unwrap();
        assert_eq!(device.address, "plc7");
        assert_eq!(device.port, 4840);
        assert!(device.endpoints.is_empty());
    }
}
