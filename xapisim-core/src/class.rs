//! Entity classes: a field table, a lock-guarded record store and the
//! hand-written operations that take precedence over synthesized ones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::accessor::Accessor;
use crate::api::XenApi;
use crate::error::{ApiError, Result};
use crate::method::{Method, Operation};
use crate::params::{arg, expect_str};
use crate::schema::FieldTable;
use crate::store::ObjectStore;
use crate::value::{Record, Value};

/// One XenAPI class.
#[derive(Debug)]
pub struct ApiClass {
    name: &'static str,
    fields: FieldTable,
    store: RwLock<ObjectStore>,
    methods: BTreeMap<&'static str, Method>,
    unimplemented: BTreeSet<&'static str>,
}

impl ApiClass {
    /// Create a class with the operations every class shares.
    pub fn new(name: &'static str, fields: FieldTable) -> Self {
        let mut class = Self {
            name,
            fields,
            store: RwLock::new(ObjectStore::new(name)),
            methods: BTreeMap::new(),
            unimplemented: BTreeSet::new(),
        };
        for method in common_methods() {
            class.methods.insert(method.name(), method);
        }
        class
    }

    /// Register a hand-written operation, replacing any of the same name.
    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.insert(method.name(), method);
        self
    }

    /// Known XenAPI operations the simulator answers with `NOT_IMPLEMENTED`.
    pub fn with_unimplemented(mut self, names: &[&'static str]) -> Self {
        self.unimplemented.extend(names.iter().copied());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Resolve an operation name: hand-written first, then synthesized.
    pub fn resolve(&self, op: &str) -> Result<Operation<'_>> {
        if let Some(method) = self.methods.get(op) {
            return Ok(Operation::Method(method));
        }
        if let Some(accessor) = Accessor::resolve(&self.fields, op) {
            return Ok(Operation::Accessor(accessor));
        }
        if self.unimplemented.contains(op) {
            return Err(ApiError::not_implemented(op));
        }
        Err(ApiError::method_unknown(format!("{}.{}", self.name, op)))
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, ObjectStore>> {
        self.store
            .read()
            .map_err(|_| ApiError::internal("Lock poisoned"))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, ObjectStore>> {
        self.store
            .write()
            .map_err(|_| ApiError::internal("Lock poisoned"))
    }

    /// Check that a value is usable as a reference to this class.
    pub fn check_ref<'a>(&self, value: &'a Value) -> Result<&'a str> {
        value.as_str().ok_or_else(|| ApiError::field_type(self.name))
    }

    /// Fail with `HANDLE_INVALID` unless `obj_ref` names a record.
    pub fn ensure_exists(&self, obj_ref: &str) -> Result<()> {
        if self.read()?.contains(obj_ref) {
            Ok(())
        } else {
            Err(ApiError::handle_invalid(self.name, obj_ref))
        }
    }

    /// Type and existence check in one step.
    pub fn require_ref<'a>(&self, value: &'a Value) -> Result<&'a str> {
        let obj_ref = self.check_ref(value)?;
        self.ensure_exists(obj_ref)?;
        Ok(obj_ref)
    }

    pub fn get_record(&self, obj_ref: &str) -> Result<Record> {
        Ok(self.read()?.get(obj_ref)?.clone())
    }

    pub fn field_value(&self, obj_ref: &str, field: &str) -> Result<Value> {
        let store = self.read()?;
        let record = store.get(obj_ref)?;
        Ok(record.get(field).cloned().unwrap_or(Value::Nil))
    }

    /// Mutate one record under the write lock.
    pub fn update<F, T>(&self, obj_ref: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Record) -> Result<T>,
    {
        let mut store = self.write()?;
        f(store.get_mut(obj_ref)?)
    }

    pub fn insert(&self, record: Record) -> Result<String> {
        self.write()?.insert(record)
    }

    /// Store a record under a caller-chosen reference.
    pub fn seed(&self, obj_ref: &str, record: Record) -> Result<()> {
        self.write()?.put(obj_ref.to_string(), record)
    }

    pub fn destroy(&self, obj_ref: &str) -> Result<Record> {
        self.write()?.delete(obj_ref)
    }

    pub fn refs(&self) -> Result<Vec<String>> {
        Ok(self.read()?.refs())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

fn common_methods() -> Vec<Method> {
    vec![
        Method::new("get_all", 0, get_all),
        Method::new("get_all_records", 0, get_all_records),
        Method::new("get_by_name_label", 1, get_by_name_label),
        Method::new("get_by_uuid", 1, get_by_uuid),
        Method::new("get_record", 1, get_record),
        Method::new("echo", 1, echo),
    ]
}

fn get_all(_api: &XenApi, class: &ApiClass, _args: &[Value]) -> Result<Option<Value>> {
    let refs = class.refs()?;
    Ok(Some(Value::string_list(refs)))
}

fn get_all_records(_api: &XenApi, class: &ApiClass, _args: &[Value]) -> Result<Option<Value>> {
    let store = class.read()?;
    let records: Record = store
        .records()
        .map(|(obj_ref, record)| (obj_ref.clone(), Value::Struct(record.clone())))
        .collect();
    Ok(Some(Value::Struct(records)))
}

fn get_by_name_label(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let label = expect_str(arg(args, 0)?, "label")?;
    let refs = class.read()?.find_by_label(label);
    Ok(Some(Value::string_list(refs)))
}

fn get_by_uuid(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let uuid = expect_str(arg(args, 0)?, "uuid")?;
    let obj_ref = class.read()?.find_by_uuid(uuid)?;
    Ok(Some(Value::String(obj_ref)))
}

fn get_record(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let obj_ref = class.check_ref(arg(args, 0)?)?;
    Ok(Some(Value::Struct(class.get_record(obj_ref)?)))
}

fn echo(_api: &XenApi, _class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    Ok(Some(arg(args, 0)?.clone()))
}
