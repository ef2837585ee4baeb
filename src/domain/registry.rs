//! Mutations on an in-memory source list, shared by every registry backend.

use crate::domain::model::{Source, SourceUpdate};
use crate::utils::error::{AutoHostsError, Result};
use crate::utils::validation::validate_url;
use chrono::{DateTime, Utc};

fn position(sources: &[Source], id: &str) -> Result<usize> {
    sources
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| AutoHostsError::SourceNotFoundError { id: id.to_string() })
}

fn ensure_unique(sources: &[Source], url: &str, except: Option<usize>) -> Result<()> {
    let taken = sources
        .iter()
        .enumerate()
        .any(|(i, s)| Some(i) != except && s.url == url);
    if taken {
        return Err(AutoHostsError::DuplicateUrlError {
            url: url.to_string(),
        });
    }
    Ok(())
}

fn clean_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

pub fn add(sources: &mut Vec<Source>, url: &str, name: Option<&str>) -> Result<Source> {
    let url = url.trim();
    validate_url("url", url)?;
    ensure_unique(sources, url, None)?;

    let source = Source {
        id: uuid::Uuid::new_v4().to_string(),
        url: url.to_string(),
        name: clean_name(name),
        enabled: true,
        last_fetch: None,
        last_error: None,
    };
    sources.push(source.clone());
    Ok(source)
}

pub fn update(sources: &mut [Source], id: &str, update: SourceUpdate) -> Result<Source> {
    let index = position(sources, id)?;

    let url = match update.url.as_deref().map(str::trim) {
        Some(url) => {
            validate_url("url", url)?;
            ensure_unique(sources, url, Some(index))?;
            Some(url.to_string())
        }
        None => None,
    };

    let entry = &mut sources[index];
    if let Some(url) = url {
        entry.url = url;
    }
    if update.name.is_some() {
        entry.name = clean_name(update.name.as_deref());
    }
    if let Some(enabled) = update.enabled {
        entry.enabled = enabled;
    }
    Ok(entry.clone())
}

pub fn remove(sources: &mut Vec<Source>, id: &str) -> Result<Source> {
    let index = position(sources, id)?;
    Ok(sources.remove(index))
}

pub fn toggle(sources: &mut [Source], id: &str) -> Result<Source> {
    let index = position(sources, id)?;
    sources[index].enabled = !sources[index].enabled;
    Ok(sources[index].clone())
}

pub fn record_success(sources: &mut [Source], id: &str, at: DateTime<Utc>) -> Result<()> {
    let index = position(sources, id)?;
    sources[index].last_fetch = Some(at);
    sources[index].last_error = None;
    Ok(())
}

pub fn record_error(sources: &mut [Source], id: &str, message: &str) -> Result<()> {
    let index = position(sources, id)?;
    sources[index].last_error = Some(message.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_duplicate_url() {
        let mut sources = Vec::new();
        let a = add(&mut sources, "https://a.example/hosts", Some("A")).unwrap();
        toggle(&mut sources, &a.id).unwrap();

        // 停用中的也算重複
        let err = add(&mut sources, "https://a.example/hosts", None).unwrap_err();
        assert!(matches!(err, AutoHostsError::DuplicateUrlError { .. }));
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_add_trims_and_validates() {
        let mut sources = Vec::new();
        let source = add(&mut sources, "  https://b.example/hosts ", Some("  ")).unwrap();
        assert_eq!(source.url, "https://b.example/hosts");
        assert_eq!(source.name, None);
        assert!(source.enabled);

        assert!(add(&mut sources, "", None).is_err());
        assert!(add(&mut sources, "not a url", None).is_err());
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_url_match_is_case_sensitive() {
        let mut sources = Vec::new();
        add(&mut sources, "https://a.example/Hosts", None).unwrap();
        assert!(add(&mut sources, "https://a.example/hosts", None).is_ok());
    }

    #[test]
    fn test_update_excludes_self_from_duplicate_check() {
        let mut sources = Vec::new();
        let a = add(&mut sources, "https://a.example/hosts", None).unwrap();
        let b = add(&mut sources, "https://b.example/hosts", None).unwrap();

        let same = SourceUpdate {
            url: Some(a.url.clone()),
            name: Some("renamed".to_string()),
            enabled: None,
        };
        let updated = update(&mut sources, &a.id, same).unwrap();
        assert_eq!(updated.name.as_deref(), Some("renamed"));

        let clash = SourceUpdate {
            url: Some(a.url.clone()),
            ..Default::default()
        };
        assert!(matches!(
            update(&mut sources, &b.id, clash),
            Err(AutoHostsError::DuplicateUrlError { .. })
        ));
        assert_eq!(sources[1].url, "https://b.example/hosts");
    }

    #[test]
    fn test_record_outcomes() {
        let mut sources = Vec::new();
        let a = add(&mut sources, "https://a.example/hosts", None).unwrap();
        let at = Utc::now();

        record_success(&mut sources, &a.id, at).unwrap();
        record_error(&mut sources, &a.id, "boom").unwrap();
        assert_eq!(sources[0].last_fetch, Some(at));
        assert_eq!(sources[0].last_error.as_deref(), Some("boom"));

        record_success(&mut sources, &a.id, at).unwrap();
        assert_eq!(sources[0].last_error, None);

        assert!(matches!(
            record_error(&mut sources, "missing", "x"),
            Err(AutoHostsError::SourceNotFoundError { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let mut sources = Vec::new();
        let a = add(&mut sources, "https://a.example/hosts", None).unwrap();
        assert_eq!(remove(&mut sources, &a.id).unwrap().id, a.id);
        assert!(sources.is_empty());
        assert!(remove(&mut sources, &a.id).is_err());
    }
}
