use reqwest::Url;

use crate::error::PipelineError;

/// Parse `audio_url` and accept it only when it is http(s) on an
/// allow-listed host. Hosts compare case-insensitively and exactly;
/// subdomains are not implied.
pub fn validate_source(audio_url: &str, allowed_hosts: &[String]) -> Result<Url, PipelineError> {
    let url = Url::parse(audio_url.trim())
        .map_err(|e| PipelineError::Validation(format!("'{audio_url}' is not a valid URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::Validation(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| PipelineError::Validation(format!("'{audio_url}' has no host")))?;

    if !allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return Err(PipelineError::Validation(format!(
            "only URLs from {} are allowed, got '{}'",
            allowed_hosts.join(", "),
            host
        )));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["dsxcdn.adi.gg".to_string()]
    }

    #[test]
    fn accepts_allowed_host() {
        let url = validate_source("https://dsxcdn.adi.gg/audio/track.mp3", &allowed()).unwrap();
        assert_eq!(url.path(), "/audio/track.mp3");
        assert!(validate_source("http://DSXCDN.adi.gg/x.wav", &allowed()).is_ok());
    }

    #[test]
    fn rejects_other_hosts() {
        for bad in [
            "https://evil.com/track.mp3",
            "evil.com/track.mp3",
            "https://dsxcdn.adi.gg.evil.com/track.mp3",
            "https://sub.dsxcdn.adi.gg/track.mp3",
            "ftp://dsxcdn.adi.gg/track.mp3",
            "file:///etc/passwd",
            "",
        ] {
            assert!(
                matches!(validate_source(bad, &allowed()), Err(PipelineError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn userinfo_does_not_spoof_host() {
        let err = validate_source("https://dsxcdn.adi.gg@evil.com/t.mp3", &allowed());
        assert!(err.is_err());
    }
}
