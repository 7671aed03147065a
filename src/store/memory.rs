use super::{Batch, KeyValueStore, Op, StoreError, StoreResult};
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    Hash(HashMap<String, String>),
}

type Data = BTreeMap<String, Value>;

/// In-process [`KeyValueStore`].
///
/// Batches run under a single write lock, so they are atomic. `set_offline(true)` makes
/// every call fail with [`StoreError::Unavailable`], for exercising fault paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

fn set_ref<'a>(data: &'a Data, key: &str) -> StoreResult<Option<&'a BTreeSet<String>>> {
    match data.get(key) {
        None => Ok(None),
        Some(Value::Set(set)) => Ok(Some(set)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn set_mut<'a>(data: &'a mut Data, key: &str) -> StoreResult<&'a mut BTreeSet<String>> {
    let value = data
        .entry(key.to_string())
        .or_insert_with(|| Value::Set(BTreeSet::new()));
    match value {
        Value::Set(set) => Ok(set),
        _ => Err(wrong_type(key)),
    }
}

fn hash_ref<'a>(data: &'a Data, key: &str) -> StoreResult<Option<&'a HashMap<String, String>>> {
    match data.get(key) {
        None => Ok(None),
        Some(Value::Hash(hash)) => Ok(Some(hash)),
        Some(_) => Err(wrong_type(key)),
    }
}

/// Drop a collection key once it is empty
fn prune(data: &mut Data, key: &str) {
    let empty = match data.get(key) {
        Some(Value::Set(set)) => set.is_empty(),
        Some(Value::Hash(hash)) => hash.is_empty(),
        _ => false,
    };
    if empty {
        data.remove(key);
    }
}

fn store_set(data: &mut Data, dest: &str, members: BTreeSet<String>) {
    if members.is_empty() {
        data.remove(dest);
    } else {
        data.insert(dest.to_string(), Value::Set(members));
    }
}

fn apply(data: &mut Data, op: &Op) -> StoreResult<()> {
    match op {
        Op::Set { key, value } => {
            data.insert(key.clone(), Value::Str(value.clone()));
        }
        Op::Del { key } => {
            data.remove(key);
        }
        Op::SAdd { key, member } => {
            set_mut(data, key)?.insert(member.clone());
        }
        Op::SRem { key, member } => {
            if set_ref(data, key)?.is_some() {
                set_mut(data, key)?.remove(member);
                prune(data, key);
            }
        }
        Op::SUnionStore { dest, keys } => {
            let mut union = BTreeSet::new();
            for key in keys {
                if let Some(set) = set_ref(data, key)? {
                    union.extend(set.iter().cloned());
                }
            }
            store_set(data, dest, union);
        }
        Op::SDiffStore { dest, keys } => {
            let mut diff = match keys.first() {
                Some(first) => set_ref(data, first)?.cloned().unwrap_or_default(),
                None => BTreeSet::new(),
            };
            for key in keys.iter().skip(1) {
                if let Some(set) = set_ref(data, key)? {
                    diff.retain(|m| !set.contains(m));
                }
            }
            store_set(data, dest, diff);
        }
        Op::HSet { key, field, value } => {
            let entry = data
                .entry(key.clone())
                .or_insert_with(|| Value::Hash(HashMap::new()));
            match entry {
                Value::Hash(hash) => {
                    hash.insert(field.clone(), value.clone());
                }
                _ => return Err(wrong_type(key)),
            }
        }
        Op::HDel { key, field } => match data.get_mut(key) {
            Some(Value::Hash(hash)) => {
                hash.remove(field);
                prune(data, key);
            }
            Some(_) => return Err(wrong_type(key)),
            None => {}
        },
    }
    Ok(())
}

/// Type-check every op against the current data before anything is applied
fn validate(data: &Data, batch: &Batch) -> StoreResult<()> {
    // Keys created earlier in the same batch may change type; track them as we go.
    let mut pending: HashMap<&str, Option<&'static str>> = HashMap::new();
    let kind_of = |pending: &HashMap<&str, Option<&'static str>>, key: &str| match pending
        .get(key)
    {
        Some(kind) => *kind,
        None => data.get(key).map(|v| match v {
            Value::Str(_) => "str",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
        }),
    };
    let check_kind = |kind: Option<&'static str>, want: &'static str, key: &str| match kind {
        Some(k) if k != want => Err(wrong_type(key)),
        _ => Ok(()),
    };

    for op in batch.ops() {
        match op {
            Op::Set { key, .. } => {
                pending.insert(key.as_str(), Some("str"));
            }
            Op::Del { key } => {
                pending.insert(key.as_str(), None);
            }
            Op::SAdd { key, .. } => {
                check_kind(kind_of(&pending, key), "set", key)?;
                pending.insert(key.as_str(), Some("set"));
            }
            Op::SRem { key, .. } => check_kind(kind_of(&pending, key), "set", key)?,
            Op::SUnionStore { dest, keys } | Op::SDiffStore { dest, keys } => {
                for key in keys {
                    check_kind(kind_of(&pending, key), "set", key)?;
                }
                pending.insert(dest.as_str(), Some("set"));
            }
            Op::HSet { key, .. } => {
                check_kind(kind_of(&pending, key), "hash", key)?;
                pending.insert(key.as_str(), Some("hash"));
            }
            Op::HDel { key, .. } => check_kind(kind_of(&pending, key), "hash", key)?,
        }
    }
    Ok(())
}

/// Glob match supporting `*` only
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let last = rest[rest.len() - 1];
    for part in &rest[..rest.len() - 1] {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

/// Page through `items`, Redis style: cursor is an offset, 0 means done
fn page<I>(items: I, total: usize, cursor: u64, count: usize) -> (u64, Vec<String>)
where
    I: Iterator<Item = String>,
{
    let start = cursor as usize;
    let count = count.max(1);
    let chunk: Vec<String> = items.skip(start).take(count).collect();
    let end = start + count;
    let next = if end >= total { 0 } else { end as u64 };
    (next, chunk)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_online()?;
        match self.data.read().await.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_online()?;
        self.data
            .write()
            .await
            .insert(key.to_string(), Value::Str(value.to_string()));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.check_online()?;
        let mut data = self.data.write().await;
        Ok(keys.iter().filter(|k| data.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check_online()?;
        Ok(self.data.read().await.contains_key(key))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check_online()?;
        let mut data = self.data.write().await;
        let current = match data.get(key) {
            None => 0,
            Some(Value::Str(s)) => s.parse::<i64>().map_err(|_| StoreError::InvalidValue {
                key: key.to_string(),
                value: s.clone(),
            })?,
            Some(_) => return Err(wrong_type(key)),
        };
        let next = current + 1;
        data.insert(key.to_string(), Value::Str(next.to_string()));
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check_online()?;
        let mut data = self.data.write().await;
        Ok(set_mut(&mut data, key)?.insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check_online()?;
        let mut data = self.data.write().await;
        if set_ref(&data, key)?.is_none() {
            return Ok(false);
        }
        let removed = set_mut(&mut data, key)?.remove(member);
        prune(&mut data, key);
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.check_online()?;
        let data = self.data.read().await;
        Ok(set_ref(&data, key)?.is_some_and(|set| set.contains(member)))
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.check_online()?;
        let data = self.data.read().await;
        Ok(set_ref(&data, key)?.map_or(0, |set| set.len() as u64))
    }

    async fn srandmember(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_online()?;
        let data = self.data.read().await;
        let picked = set_ref(&data, key)?
            .and_then(|set| set.iter().choose(&mut rand::rng()).cloned());
        Ok(picked)
    }

    async fn sscan(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.check_online()?;
        let data = self.data.read().await;
        match set_ref(&data, key)? {
            None => Ok((0, Vec::new())),
            Some(set) => Ok(page(set.iter().cloned(), set.len(), cursor, count)),
        }
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.check_online()?;
        let data = self.data.read().await;
        let (next, keys) = page(data.keys().cloned(), data.len(), cursor, count);
        let matched = keys.into_iter().filter(|k| glob_match(pattern, k)).collect();
        Ok((next, matched))
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.check_online()?;
        let data = self.data.read().await;
        Ok(hash_ref(&data, key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.check_online()?;
        let data = self.data.read().await;
        Ok(hash_ref(&data, key)?.cloned().unwrap_or_default())
    }

    async fn exec(&self, batch: Batch) -> StoreResult<()> {
        self.check_online()?;
        let mut data = self.data.write().await;
        validate(&data, &batch)?;
        for op in batch.ops() {
            apply(&mut data, op)?;
        }
        Ok(())
    }
}
