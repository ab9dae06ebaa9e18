//! Request context enrichment from HTTP headers.
//!
//! Parses user_agent strings with woothee to fill os, browser, and device.
//! Missing or unparseable headers leave the field empty; enrichment never fails a request.

use axum::http::HeaderMap;
use engine_core::{
    limits::{MAX_IP_LEN, MAX_LOCALE_LEN, MAX_TIMEZONE_LEN, MAX_USER_AGENT_LEN},
    Context,
};
use woothee::parser::Parser;

pub const TIMEZONE_HEADER: &str = "X-Timezone";

/// Builds a [`Context`] for each admitted request.
pub struct ContextEnricher {
    parser: Parser,
}

impl ContextEnricher {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Returns `None` when the request carries nothing worth recording.
    pub fn enrich(&self, headers: &HeaderMap, client_ip: Option<String>) -> Option<Context> {
        let user_agent = header(headers, "User-Agent", MAX_USER_AGENT_LEN);

        let mut context = Context {
            ip: client_ip.map(|ip| clip(&ip, MAX_IP_LEN)),
            locale: header(headers, "Accept-Language", 256).and_then(|v| primary_locale(&v)),
            timezone: header(headers, TIMEZONE_HEADER, MAX_TIMEZONE_LEN),
            ..Context::default()
        };

        if let Some(ref ua) = user_agent {
            if let Some(result) = self.parser.parse(ua) {
                context.browser = known(result.name);
                context.os = known(result.os);
                context.device = Some(device_type(result.category).to_string());
            }
        }
        context.user_agent = user_agent;

        (context != Context::default()).then_some(context)
    }
}

impl Default for ContextEnricher {
    fn default() -> Self {
        Self::new()
    }
}

/// Map woothee categories (pc, smartphone, mobilephone, crawler, appliance, misc)
/// to device types.
pub fn device_type(category: &str) -> &'static str {
    match category {
        "pc" => "desktop",
        "smartphone" | "mobilephone" => "mobile",
        "crawler" => "bot",
        "appliance" => "other",
        _ => "unknown",
    }
}

/// First language tag of an Accept-Language value, without its quality weight.
pub fn primary_locale(accept_language: &str) -> Option<String> {
    let tag = accept_language.split(',').next()?.split(';').next()?.trim();
    if tag.is_empty() || tag == "*" {
        return None;
    }
    Some(clip(tag, MAX_LOCALE_LEN))
}

fn known(value: &str) -> Option<String> {
    (!value.is_empty() && value != "UNKNOWN").then(|| value.to_string())
}

fn header(headers: &HeaderMap, name: &str, max_len: usize) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| clip(value, max_len))
}

fn clip(value: &str, max_len: usize) -> String {
    match value.char_indices().nth(max_len) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
