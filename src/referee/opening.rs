use crate::dictionary::Dictionary;
use crate::store::StoreResult;
use crate::text::Phrase;
use std::collections::HashSet;

/// One way of looking for an opening phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningStrategy {
    /// Draw random dictionary phrases, up to `attempts` times
    RandomDraws { attempts: usize },
    /// Walk the whole dictionary page by page
    FullScan { page_size: usize },
}

/// Pick an opening that some dictionary phrase can answer.
///
/// Strategies run in order and share the set of phrases already rejected, so the scan
/// never re-checks a phrase a random draw already ruled out. Returns `None` when no
/// phrase in the dictionary qualifies.
pub async fn select_opening(
    dictionary: &Dictionary,
    strategies: &[OpeningStrategy],
) -> StoreResult<Option<Phrase>> {
    let mut tried = HashSet::new();
    for strategy in strategies {
        let found = match *strategy {
            OpeningStrategy::RandomDraws { attempts } => {
                random_draws(dictionary, attempts, &mut tried).await?
            }
            OpeningStrategy::FullScan { page_size } => {
                full_scan(dictionary, page_size, &mut tried).await?
            }
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

async fn qualifies(dictionary: &Dictionary, candidate: &Phrase) -> StoreResult<bool> {
    dictionary.has_continuation(candidate).await
}

async fn random_draws(
    dictionary: &Dictionary,
    attempts: usize,
    tried: &mut HashSet<Phrase>,
) -> StoreResult<Option<Phrase>> {
    for _ in 0..attempts {
        let Some(candidate) = dictionary.random_phrase().await? else {
            // Empty dictionary
            return Ok(None);
        };
        if !tried.insert(candidate.clone()) {
            continue;
        }
        if qualifies(dictionary, &candidate).await? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

async fn full_scan(
    dictionary: &Dictionary,
    page_size: usize,
    tried: &mut HashSet<Phrase>,
) -> StoreResult<Option<Phrase>> {
    let page_size = page_size.max(1);
    let mut cursor = 0;
    loop {
        let (next, page) = dictionary.scan_page(cursor, page_size).await?;
        for candidate in page {
            if tried.contains(&candidate) {
                continue;
            }
            if qualifies(dictionary, &candidate).await? {
                return Ok(Some(candidate));
            }
            tried.insert(candidate);
        }
        if next == 0 {
            return Ok(None);
        }
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapConfig;
    use crate::store::{MemoryStore, RetryPolicy};
    use std::sync::Arc;

    async fn dictionary(lines: &[&str]) -> Dictionary {
        let dict = Dictionary::new(Arc::new(MemoryStore::new()), RetryPolicy::none());
        dict.bootstrap(lines.iter().copied(), &BootstrapConfig::default())
            .await
            .unwrap();
        dict
    }

    #[tokio::test]
    async fn test_random_draws_only_pick_answerable() {
        let dict = dictionary(&["con mèo", "mèo con", "con chó"]).await;
        for _ in 0..50 {
            let opening = select_opening(&dict, &[OpeningStrategy::RandomDraws { attempts: 64 }])
                .await
                .unwrap();
            if let Some(opening) = opening {
                assert_ne!(opening.as_str(), "con chó");
            }
        }
    }

    #[tokio::test]
    async fn test_full_scan_finds_the_single_candidate() {
        let mut lines = vec!["xin chào"];
        lines.extend(["a1", "b2", "c3", "d4", "e5", "f6"]);
        lines.push("chào bạn");
        let dict = dictionary(&lines).await;

        let opening = select_opening(&dict, &[OpeningStrategy::FullScan { page_size: 3 }])
            .await
            .unwrap();
        assert_eq!(opening.unwrap().as_str(), "xin chào");
    }

    #[tokio::test]
    async fn test_scan_falls_back_after_draws() {
        let dict = dictionary(&["a1", "b2", "xin chào", "chào bạn"]).await;
        let strategies = [
            OpeningStrategy::RandomDraws { attempts: 0 },
            OpeningStrategy::FullScan { page_size: 1 },
        ];
        let opening = select_opening(&dict, &strategies).await.unwrap();
        assert_eq!(opening.unwrap().as_str(), "xin chào");
    }

    #[tokio::test]
    async fn test_no_answerable_phrase() {
        let dict = dictionary(&["con chó", "xin chào"]).await;
        let strategies = [
            OpeningStrategy::RandomDraws { attempts: 16 },
            OpeningStrategy::FullScan { page_size: 10 },
        ];
        assert!(select_opening(&dict, &strategies).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_self_answering_phrases_never_open() {
        let dict = dictionary(&["mèo mèo", "a1", "con chó"]).await;
        let strategies = [
            OpeningStrategy::RandomDraws { attempts: 64 },
            OpeningStrategy::FullScan { page_size: 2 },
        ];
        assert!(select_opening(&dict, &strategies).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_dictionary() {
        let dict = Dictionary::new(Arc::new(MemoryStore::new()), RetryPolicy::none());
        let strategies = [
            OpeningStrategy::RandomDraws { attempts: 16 },
            OpeningStrategy::FullScan { page_size: 10 },
        ];
        assert!(select_opening(&dict, &strategies).await.unwrap().is_none());
    }
}
