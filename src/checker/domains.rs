// src/checker/domains.rs
// =============================================================================
// Domain policy for the link classifier.
//
// Three domain lists steer the classifier before any network call:
// - trusted_domains: known to block or rate-limit automated probes; links on
//   these hosts are reported as unchecked instead of wasting attempts
// - storefront_domains: marketplace hosts whose pages answer 200 even for
//   removed listings; these get a body scan instead of an existence probe
// - the suspicion heuristic: low-trust TLDs, excessive subdomain nesting,
//   and a lightweight typosquatting check against well-known brands
// =============================================================================

use url::Url;

// More dot-separated labels than this reads as subdomain abuse
const MAX_HOST_LABELS: usize = 4;

#[derive(Debug, Clone)]
pub struct DomainPolicy {
    /// Hosts that are never probed; matching links come back `unchecked`
    pub trusted_domains: Vec<String>,
    /// Marketplace hosts routed to the page-body availability check
    pub storefront_domains: Vec<String>,
    /// Top-level domains with a poor abuse track record
    pub suspicious_tlds: Vec<String>,
    /// Brand names watched for typosquatting lookalikes
    pub brand_names: Vec<String>,
    /// Lowercase page-body markers meaning a listing was removed
    pub unavailable_markers: Vec<String>,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            trusted_domains: vec![
                "youtube.com".into(),
                "youtu.be".into(),
                "instagram.com".into(),
                "facebook.com".into(),
                "twitter.com".into(),
                "x.com".into(),
                "linkedin.com".into(),
                "tiktok.com".into(),
                "discord.gg".into(),
                "spotify.com".into(),
            ],
            storefront_domains: vec![
                "amazon.com".into(),
                "amzn.to".into(),
                "ebay.com".into(),
                "etsy.com".into(),
                "aliexpress.com".into(),
            ],
            suspicious_tlds: vec![
                ".tk".into(),
                ".ml".into(),
                ".ga".into(),
                ".cf".into(),
                ".gq".into(),
                ".xyz".into(),
                ".top".into(),
                ".club".into(),
            ],
            brand_names: vec![
                "google".into(),
                "facebook".into(),
                "amazon".into(),
                "apple".into(),
                "microsoft".into(),
            ],
            unavailable_markers: vec![
                "currently unavailable".into(),
                "no longer available".into(),
                "page not found".into(),
                "this listing has ended".into(),
                "looking for something?".into(),
            ],
        }
    }
}

impl DomainPolicy {
    pub fn is_trusted(&self, host: &str) -> bool {
        matches_any(&self.trusted_domains, host)
    }

    pub fn is_storefront(&self, host: &str) -> bool {
        matches_any(&self.storefront_domains, host)
    }

    // Advisory suspicion heuristic. Makes no network calls; callers combine
    // it with probe results as they see fit.
    pub fn is_suspicious(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };

        if self.suspicious_tlds.iter().any(|tld| host.ends_with(tld)) {
            return true;
        }

        if host.split('.').count() > MAX_HOST_LABELS {
            return true;
        }

        // "microsoft-support.example" mentions the brand without being the
        // brand's registered domain
        self.brand_names.iter().any(|brand| {
            host.contains(brand.as_str()) && !host.contains(&format!("{brand}.com"))
        })
    }
}

// Exact match, or any subdomain of a listed domain.
fn matches_any(domains: &[String], host: &str) -> bool {
    domains
        .iter()
        .any(|d| host == d.as_str() || host.ends_with(&format!(".{d}")))
}

// Pulls the lowercase host out of a URL string, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_exact_and_subdomain() {
        let policy = DomainPolicy::default();
        assert!(policy.is_trusted("instagram.com"));
        assert!(policy.is_trusted("www.instagram.com"));
        assert!(!policy.is_trusted("notinstagram.com"));
    }

    #[test]
    fn test_storefront_matching() {
        let policy = DomainPolicy::default();
        assert!(policy.is_storefront("amazon.com"));
        assert!(policy.is_storefront("smile.amazon.com"));
        assert!(!policy.is_storefront("example.com"));
    }

    #[test]
    fn test_suspicious_tld() {
        let policy = DomainPolicy::default();
        assert!(policy.is_suspicious("http://free-stuff.xyz/deal"));
        assert!(policy.is_suspicious("https://win.a.prize.tk"));
        assert!(!policy.is_suspicious("https://example.com"));
    }

    #[test]
    fn test_excessive_subdomains() {
        let policy = DomainPolicy::default();
        assert!(policy.is_suspicious("https://a.b.c.d.example.com"));
        assert!(!policy.is_suspicious("https://www.blog.example.com"));
    }

    #[test]
    fn test_brand_typosquatting() {
        let policy = DomainPolicy::default();
        assert!(policy.is_suspicious("https://google-login.example.net"));
        assert!(policy.is_suspicious("https://rnicrosoft-microsoft.support"));
        assert!(!policy.is_suspicious("https://www.google.com/maps"));
    }

    #[test]
    fn test_unparseable_url_is_not_suspicious() {
        let policy = DomainPolicy::default();
        assert!(!policy.is_suspicious("http://"));
        assert!(!policy.is_suspicious("not a url"));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://Example.COM/path"), Some("example.com".into()));
        assert_eq!(host_of("nonsense"), None);
    }
}
