//! `network` class.

use super::{destroy, record_from_args};
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_struct};
use crate::schema::FieldTable;
use crate::value::{new_ref, Value};

const BRIDGE_PREFIX: &str = "xapi";

fn fields() -> FieldTable {
    FieldTable::new()
        .int64("MTU", 0)
        .field("PIFs", Value::empty_list())
        .field("VIFs", Value::empty_list())
        .field("allowed_operations", Value::empty_list())
        .field("assigned_ips", Value::empty_map())
        .field("blobs", Value::empty_map())
        .field("bridge", "")
        .field("current_operations", Value::empty_map())
        .field("default_locking_mode", "")
        .field("managed", true)
        .field("name_description", "")
        .field("name_label", "")
        .field("purpose", Value::empty_list())
        .field("tags", Value::empty_list())
        .read_write(&["MTU", "name_description", "name_label", "tags"])
        .lists(&["purpose", "tags"])
}

pub(crate) fn class() -> Result<ApiClass> {
    let class = ApiClass::new("network", fields())
        .with_unimplemented(&["attach", "create_new_blob", "pool_introduce"])
        .with_method(Method::new("create", 1, create))
        .with_method(Method::new("destroy", 1, destroy));

    let mut record = class.fields().default_record();
    record.insert("MTU".into(), Value::from("1500"));
    record.insert("bridge".into(), Value::from("xenapi"));
    record.insert("default_locking_mode".into(), Value::from("unlocked"));
    record.insert(
        "name_description".into(),
        Value::from(
            "Network on which guests will be assigned a private link-local IP address \
             which can be used to talk XenAPI",
        ),
    );
    record.insert(
        "name_label".into(),
        Value::from("Host internal management network"),
    );
    record.insert(
        "other_config".into(),
        Value::string_map([
            ("ip_begin", "169.254.0.1"),
            ("ip_end", "169.254.255.254"),
            ("is_guest_installer_network", "true"),
            ("is_host_internal_management_network", "true"),
            ("netmask", "255.255.0.0"),
        ]),
    );
    class.seed(&new_ref(), record)?;

    Ok(class)
}

fn create(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let requested = expect_struct(arg(args, 0)?, "args")?;
    let mut record = record_from_args(
        class.fields(),
        requested,
        &[
            "MTU",
            "bridge",
            "managed",
            "name_description",
            "name_label",
            "other_config",
            "tags",
        ],
        &["other_config"],
    )?;

    if !requested.contains_key("MTU") {
        record.insert("MTU".into(), Value::from("1500"));
    }
    record.insert("default_locking_mode".into(), Value::from("unlocked"));

    // Bridge numbering and insert share one write lock.
    let mut store = class.write()?;
    if !requested.contains_key("bridge") {
        let next = store
            .records()
            .filter_map(|(_, r)| r.get("bridge").and_then(Value::as_str))
            .filter_map(|bridge| bridge.strip_prefix(BRIDGE_PREFIX))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        record.insert("bridge".into(), Value::String(format!("{}{}", BRIDGE_PREFIX, next)));
    }
    let network_ref = store.insert(record)?;
    Ok(Some(Value::String(network_ref)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_management_network() {
        let class = class().unwrap();
        let store = class.read().unwrap();
        let refs = store.find_by_label("Host internal management network");
        assert_eq!(refs.len(), 1);
        assert_eq!(store.get(&refs[0]).unwrap()["bridge"], Value::from("xenapi"));
    }
}
