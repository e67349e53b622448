use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Mutex, MutexGuard};

use opcmsg_codec::{ParamId, ParamValue};

use crate::provider::{DataProvider, ProviderError, ProviderResult};

type Method = Box<dyn Fn(&ParamId, Vec<ParamValue>) -> ProviderResult<Vec<ParamValue>> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Same variant, and for arrays the same element kind.
fn same_kind(a: &ParamValue, b: &ParamValue) -> bool {
    match (a, b) {
        (ParamValue::Array(x), ParamValue::Array(y)) => mem::discriminant(x) == mem::discriminant(y),
        _ => mem::discriminant(a) == mem::discriminant(b),
    }
}

/// A [`DataProvider`] backed by a map of values and a table of methods.
///
/// Writes must keep the stored value's type. Subscriptions are only
/// recorded; pushing notifications is up to the owner of the handler.
#[derive(Default)]
pub struct MemoryProvider {
    values: Mutex<HashMap<ParamId, ParamValue>>,
    subscriptions: Mutex<HashSet<ParamId>>,
    methods: HashMap<ParamId, Method>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, id: ParamId, value: impl Into<ParamValue>) -> Self {
        lock(&self.values).insert(id, value.into());
        self
    }

    pub fn with_method<F>(mut self, id: ParamId, method: F) -> Self
    where
        F: Fn(&ParamId, Vec<ParamValue>) -> ProviderResult<Vec<ParamValue>> + Send + Sync + 'static,
    {
        self.methods.insert(id, Box::new(method));
        self
    }

    /// Store a value directly, bypassing the type check. Returns the old value.
    pub fn set(&self, id: ParamId, value: impl Into<ParamValue>) -> Option<ParamValue> {
        lock(&self.values).insert(id, value.into())
    }

    pub fn get(&self, id: &ParamId) -> Option<ParamValue> {
        lock(&self.values).get(id).cloned()
    }

    pub fn is_subscribed(&self, id: &ParamId) -> bool {
        lock(&self.subscriptions).contains(id)
    }

    pub fn subscriptions(&self) -> Vec<ParamId> {
        lock(&self.subscriptions).iter().cloned().collect()
    }

    fn ensure_known(&self, id: &ParamId) -> ProviderResult<()> {
        if lock(&self.values).contains_key(id) {
            Ok(())
        } else {
            Err(ProviderError::not_found(id))
        }
    }
}

impl DataProvider for MemoryProvider {
    fn read(&self, id: &ParamId) -> ProviderResult<ParamValue> {
        self.get(id).ok_or_else(|| ProviderError::not_found(id))
    }

    fn write(&self, id: &ParamId, value: ParamValue) -> ProviderResult<()> {
        let mut values = lock(&self.values);
        let Some(current) = values.get_mut(id) else {
            return Err(ProviderError::not_found(id));
        };
        if !same_kind(current, &value) {
            return Err(ProviderError::invalid(format!(
                "{id} holds {}, got {}",
                current.type_name(),
                value.type_name()
            )));
        }
        *current = value;
        Ok(())
    }

    fn subscribe(&self, id: &ParamId) -> ProviderResult<()> {
        self.ensure_known(id)?;
        lock(&self.subscriptions).insert(id.clone());
        Ok(())
    }

    fn unsubscribe(&self, id: &ParamId) -> ProviderResult<()> {
        self.ensure_known(id)?;
        lock(&self.subscriptions).remove(id);
        Ok(())
    }

    fn call(
        &self,
        method_id: &ParamId,
        param_id: &ParamId,
        args: Vec<ParamValue>,
    ) -> ProviderResult<Vec<ParamValue>> {
        let method = self
            .methods
            .get(method_id)
            .ok_or_else(|| ProviderError::not_found(method_id))?;
        method(param_id, args)
    }

    fn reset(&self) {
        lock(&self.subscriptions).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed() -> ParamId {
        ParamId::string(2, "speed")
    }

    fn provider() -> MemoryProvider {
        MemoryProvider::new()
            .with_value(speed(), ParamValue::Int(12))
            .with_method(ParamId::string(2, "double"), |_, args| {
                let n = args
                    .first()
                    .and_then(ParamValue::as_i64)
                    .ok_or_else(|| ProviderError::invalid("expected one integer"))?;
                Ok(vec![ParamValue::Long(n * 2)])
            })
    }

    #[test]
    fn read_and_write_keep_type() {
        let p = provider();
        assert_eq!(p.read(&speed()).unwrap(), ParamValue::Int(12));
        p.write(&speed(), ParamValue::Int(30)).unwrap();
        assert_eq!(p.get(&speed()), Some(ParamValue::Int(30)));

        let err = p.write(&speed(), ParamValue::from("fast")).unwrap_err();
        assert!(matches!(err, ProviderError::Invalid(_)));
        assert_eq!(p.get(&speed()), Some(ParamValue::Int(30)));
    }

    #[test]
    fn unknown_parameter() {
        let p = provider();
        let missing = ParamId::numeric(2, 99);
        assert!(matches!(p.read(&missing), Err(ProviderError::NotFound(_))));
        assert!(matches!(
            p.write(&missing, ParamValue::Int(1)),
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(p.subscribe(&missing), Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn subscriptions_cleared_on_reset() {
        let p = provider();
        p.subscribe(&speed()).unwrap();
        assert!(p.is_subscribed(&speed()));
        assert_eq!(p.subscriptions(), vec![speed()]);
        p.reset();
        assert!(!p.is_subscribed(&speed()));
    }

    #[test]
    fn calls_dispatch_by_method_id() {
        let p = provider();
        let out = p
            .call(&ParamId::string(2, "double"), &speed(), vec![ParamValue::Int(21)])
            .unwrap();
        assert_eq!(out, vec![ParamValue::Long(42)]);
        assert!(matches!(
            p.call(&ParamId::string(2, "triple"), &speed(), vec![]),
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            p.call(&ParamId::string(2, "double"), &speed(), vec![]),
            Err(ProviderError::Invalid(_))
        ));
    }
}
