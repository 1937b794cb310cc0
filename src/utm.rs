//! UTM attribution merge.
//!
//! Produces the loose `key=value,` string consumed downstream. The format
//! and key order are an external contract.

use crate::cache::{Clock, KeyValueStore, TtlCache};
use std::collections::HashMap;
use tracing::warn;

/// Canonical keys followed by their camelCase aliases, in output order.
pub const UTM_KEYS: [&str; 10] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utmSource",
    "utmMedium",
    "utmCampaign",
    "utmTerm",
    "utmContent",
];

pub fn cache_key(utm_key: &str, form_id: &str) -> String {
    format!("{utm_key}-{form_id}")
}

/// Merge UTM values from `query` with cached ones for `form_id`.
///
/// Values found in the query are (re)cached; values only found in the cache
/// have their ttl restarted. Storage failures are logged and skip the key's
/// cache step, never the query value itself.
pub fn merge_utm_params<S, C>(query: &str, form_id: &str, cache: &TtlCache<S, C>) -> String
where
    S: KeyValueStore,
    C: Clock,
{
    let params = query_params(query);
    let mut out = String::new();
    for key in UTM_KEYS {
        let storage_key = cache_key(key, form_id);
        let value = match params.get(key) {
            Some(value) => {
                if let Err(err) = cache.put(&storage_key, value) {
                    warn!(%storage_key, %err, "failed to cache utm value");
                }
                Some(value.clone())
            }
            None => match cache.get_refreshing(&storage_key) {
                Ok(cached) => cached,
                Err(err) => {
                    warn!(%storage_key, %err, "failed to read cached utm value");
                    None
                }
            },
        };
        if let Some(value) = value {
            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push(',');
        }
    }
    out
}

/// First non-empty value per UTM key in a `?a=b&c=d` query string.
fn query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        if value.is_empty() || !UTM_KEYS.contains(&key.as_ref()) {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DEFAULT_TTL, ManualClock, MemoryStore};
    use std::time::Duration;

    fn cache() -> TtlCache<MemoryStore, ManualClock> {
        TtlCache::new(MemoryStore::new(), ManualClock::new(0), DEFAULT_TTL)
    }

    #[test]
    fn query_keys_are_emitted_in_key_list_order() {
        let cache = cache();
        let out = merge_utm_params(
            "?utmTerm=shoes&utm_campaign=spring&utm_source=google&other=1",
            "f1",
            &cache,
        );
        assert_eq!(out, "utm_source=google,utm_campaign=spring,utmTerm=shoes,");
    }

    #[test]
    fn query_values_are_cached_per_form() {
        let cache = cache();
        merge_utm_params("utm_medium=cpc", "f1", &cache);
        assert_eq!(
            cache.peek("utm_medium-f1").unwrap().as_deref(),
            Some("cpc")
        );
        assert_eq!(cache.peek("utm_medium-f2").unwrap(), None);
        assert_eq!(cache.store().len(), 1);
    }

    #[test]
    fn cached_values_backfill_missing_keys() {
        let cache = cache();
        merge_utm_params("?utm_source=google&utm_medium=cpc", "f1", &cache);
        cache.clock().advance(Duration::from_secs(60));
        let out = merge_utm_params("?utm_medium=email", "f1", &cache);
        assert_eq!(out, "utm_source=google,utm_medium=email,");
    }

    #[test]
    fn each_key_appears_once() {
        let cache = cache();
        merge_utm_params("?utm_source=old", "f1", &cache);
        let out = merge_utm_params("?utm_source=new&utm_source=dup", "f1", &cache);
        assert_eq!(out, "utm_source=new,");
    }

    #[test]
    fn expired_values_are_omitted() {
        let cache = cache();
        merge_utm_params("?utm_source=google", "f1", &cache);
        cache.clock().advance(DEFAULT_TTL);
        assert_eq!(merge_utm_params("", "f1", &cache), "");
    }

    #[test]
    fn backfill_restarts_ttl() {
        let cache = cache();
        merge_utm_params("?utmSource=news", "f1", &cache);
        cache.clock().advance(Duration::from_secs(170));
        assert_eq!(merge_utm_params("", "f1", &cache), "utmSource=news,");
        cache.clock().advance(Duration::from_secs(170));
        assert_eq!(merge_utm_params("", "f1", &cache), "utmSource=news,");
    }

    #[test]
    fn empty_query_values_count_as_absent() {
        let cache = cache();
        assert_eq!(merge_utm_params("?utm_source=&utm_term=a%20b", "f1", &cache), "utm_term=a b,");
    }
}
