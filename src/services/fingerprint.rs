//! Device fingerprinting from request metadata.
//!
//! A session is bound to the device class that created it. The fingerprint is
//! a coarse description (browser family, OS family and version, device
//! brand/model) so the raw `User-Agent` header never has to be stored, while a
//! cookie replayed from a different kind of device is still rejected.

use regex::Regex;
use std::sync::OnceLock;

/// Placeholder for any field that could not be recognised.
pub const UNKNOWN: &str = "Unknown";

const FIELD_DELIMITER: &str = "|";

/// Parsed view of a `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: String,
    pub os_family: String,
    pub os_version: String,
    pub device_family: String,
    pub device_brand: String,
    pub device_model: String,
}

impl Default for UserAgentInfo {
    fn default() -> Self {
        Self {
            browser: UNKNOWN.to_string(),
            os_family: UNKNOWN.to_string(),
            os_version: String::new(),
            device_family: UNKNOWN.to_string(),
            device_brand: UNKNOWN.to_string(),
            device_model: UNKNOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFingerprint {
    /// Also fold the client address into the identifier.
    bind_client_address: bool,
}

impl DeviceFingerprint {
    #[must_use]
    pub const fn new(bind_client_address: bool) -> Self {
        Self {
            bind_client_address,
        }
    }

    /// Derive the device identifier for a request. Never fails; anything
    /// unrecognised degrades to [`UNKNOWN`].
    #[must_use]
    pub fn compute(&self, client_address: &str, user_agent: Option<&str>) -> String {
        let ua = parse_user_agent(user_agent.unwrap_or_default());

        let mut identifier = [
            ua.browser,
            format!("{} ({})", ua.os_family, ua.os_version),
            format!(
                "{} ({} {})",
                ua.device_family, ua.device_brand, ua.device_model
            ),
        ]
        .join(FIELD_DELIMITER);

        if self.bind_client_address {
            identifier.push_str(FIELD_DELIMITER);
            identifier.push_str(client_address);
        }

        identifier
    }
}

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

#[must_use]
pub fn parse_user_agent(header: &str) -> UserAgentInfo {
    let header = header.trim();
    if header.is_empty() {
        return UserAgentInfo::default();
    }

    let (os_family, os_version) = parse_os(header);
    let (device_family, device_brand, device_model) = parse_device(header);

    UserAgentInfo {
        browser: parse_browser(header).to_string(),
        os_family,
        os_version,
        device_family,
        device_brand,
        device_model,
    }
}

fn parse_browser(ua: &str) -> &'static str {
    static RE_BOT: OnceLock<Regex> = OnceLock::new();
    let bot = get_regex(&RE_BOT, r"(?i)bot|crawler|spider|slurp");

    let mobile = ua.contains("Mobile");

    if bot.is_match(ua) {
        "Spider"
    } else if ua.contains("Edg/") || ua.contains("EdgA/") || ua.contains("EdgiOS/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("SamsungBrowser/") {
        "Samsung Internet"
    } else if ua.contains("FxiOS/") {
        "Firefox iOS"
    } else if ua.contains("Firefox/") {
        if mobile { "Firefox Mobile" } else { "Firefox" }
    } else if ua.contains("CriOS/") {
        "Chrome Mobile iOS"
    } else if ua.contains("Chrome/") || ua.contains("Chromium/") {
        if mobile { "Chrome Mobile" } else { "Chrome" }
    } else if ua.contains("Safari/") && ua.contains("Version/") {
        if mobile { "Mobile Safari" } else { "Safari" }
    } else if ua.starts_with("curl/") {
        "curl"
    } else {
        UNKNOWN
    }
}

fn parse_os(ua: &str) -> (String, String) {
    static RE_WINDOWS: OnceLock<Regex> = OnceLock::new();
    static RE_IOS: OnceLock<Regex> = OnceLock::new();
    static RE_ANDROID: OnceLock<Regex> = OnceLock::new();
    static RE_MAC: OnceLock<Regex> = OnceLock::new();

    let windows = get_regex(&RE_WINDOWS, r"Windows NT (\d+\.\d+)");
    let ios = get_regex(&RE_IOS, r"(?:iPhone|iPad|iPod).*? OS (\d+)_(\d+)(?:_(\d+))?");
    let android = get_regex(&RE_ANDROID, r"Android[ /](\d+(?:\.\d+)*)");
    let mac = get_regex(&RE_MAC, r"Mac OS X (\d+)[_.](\d+)(?:[_.](\d+))?");

    if let Some(caps) = windows.captures(ua) {
        let version = match &caps[1] {
            "10.0" => "10",
            "6.3" => "8.1",
            "6.2" => "8",
            "6.1" => "7",
            "6.0" => "Vista",
            "5.1" | "5.2" => "XP",
            other => other,
        };
        return ("Windows".to_string(), version.to_string());
    }

    if let Some(caps) = ios.captures(ua) {
        return ("iOS".to_string(), dotted_version(&caps));
    }

    if let Some(caps) = android.captures(ua) {
        return ("Android".to_string(), caps[1].to_string());
    }

    if let Some(caps) = mac.captures(ua) {
        return ("Mac OS X".to_string(), dotted_version(&caps));
    }

    if ua.contains("CrOS") {
        return ("Chrome OS".to_string(), String::new());
    }

    if ua.contains("Linux") {
        return ("Linux".to_string(), String::new());
    }

    (UNKNOWN.to_string(), String::new())
}

fn dotted_version(caps: &regex::Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn parse_device(ua: &str) -> (String, String, String) {
    static RE_ANDROID_MODEL: OnceLock<Regex> = OnceLock::new();
    let android_model = get_regex(
        &RE_ANDROID_MODEL,
        r"Android[ /][\d.]+;(?: [a-zA-Z]{2}[-_][a-zA-Z]{2};)? ([^;)]+?)(?: Build/[^;)]*)?[;)]",
    );

    for apple in ["iPhone", "iPad", "iPod"] {
        if ua.contains(apple) {
            return (apple.to_string(), "Apple".to_string(), apple.to_string());
        }
    }

    if ua.contains("Macintosh") {
        return ("Mac".to_string(), "Apple".to_string(), "Mac".to_string());
    }

    if let Some(caps) = android_model.captures(ua) {
        let model = caps[1].trim().to_string();
        let brand = android_brand(&model);
        let family = if brand == UNKNOWN {
            model.clone()
        } else {
            format!("{brand} {model}")
        };
        return (family, brand.to_string(), model);
    }

    (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string())
}

fn android_brand(model: &str) -> &'static str {
    const PREFIXES: &[(&str, &str)] = &[
        ("SM-", "Samsung"),
        ("GT-", "Samsung"),
        ("Pixel", "Google"),
        ("Nexus", "Google"),
        ("Mi ", "XiaoMi"),
        ("Redmi", "XiaoMi"),
        ("ONEPLUS", "OnePlus"),
        ("moto", "Motorola"),
        ("HUAWEI", "Huawei"),
    ];

    PREFIXES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map_or(UNKNOWN, |(_, brand)| brand)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36";
    const FIREFOX_MAC: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn test_desktop_chrome() {
        let ua = parse_user_agent(CHROME_WINDOWS);
        assert_eq!(ua.browser, "Chrome");
        assert_eq!(ua.os_family, "Windows");
        assert_eq!(ua.os_version, "10");
        assert_eq!(ua.device_family, UNKNOWN);
    }

    #[test]
    fn test_iphone_safari() {
        let ua = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(ua.browser, "Mobile Safari");
        assert_eq!(ua.os_family, "iOS");
        assert_eq!(ua.os_version, "17.1.2");
        assert_eq!(ua.device_family, "iPhone");
        assert_eq!(ua.device_brand, "Apple");
    }

    #[test]
    fn test_android_chrome() {
        let ua = parse_user_agent(CHROME_ANDROID);
        assert_eq!(ua.browser, "Chrome Mobile");
        assert_eq!(ua.os_family, "Android");
        assert_eq!(ua.os_version, "14");
        assert_eq!(ua.device_brand, "Samsung");
        assert_eq!(ua.device_model, "SM-S918B");
    }

    #[test]
    fn test_mac_firefox() {
        let ua = parse_user_agent(FIREFOX_MAC);
        assert_eq!(ua.browser, "Firefox");
        assert_eq!(ua.os_family, "Mac OS X");
        assert_eq!(ua.os_version, "10.15");
        assert_eq!(ua.device_family, "Mac");
    }

    #[test]
    fn test_missing_or_garbage_header_degrades() {
        let fp = DeviceFingerprint::default();
        let expected = "Unknown|Unknown ()|Unknown (Unknown Unknown)";
        assert_eq!(fp.compute("10.0.0.1", None), expected);
        assert_eq!(fp.compute("10.0.0.1", Some("")), expected);
        assert_eq!(fp.compute("10.0.0.1", Some("%%%garbage")), expected);
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinguishes_devices() {
        let fp = DeviceFingerprint::default();
        let a = fp.compute("10.0.0.1", Some(CHROME_WINDOWS));
        let b = fp.compute("192.168.1.7", Some(CHROME_WINDOWS));
        assert_eq!(a, b);
        assert_eq!(a, "Chrome|Windows (10)|Unknown (Unknown Unknown)");

        let c = fp.compute("10.0.0.1", Some(SAFARI_IPHONE));
        assert_ne!(a, c);
    }

    #[test]
    fn test_address_binding() {
        let fp = DeviceFingerprint::new(true);
        let a = fp.compute("10.0.0.1", Some(CHROME_WINDOWS));
        let b = fp.compute("10.0.0.2", Some(CHROME_WINDOWS));
        assert_ne!(a, b);
        assert!(a.ends_with("|10.0.0.1"));
    }
}
