//! `task` class.

use chrono::Utc;

use super::destroy;
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, Result};
use crate::method::Method;
use crate::params::{arg, expect_str};
use crate::schema::FieldTable;
use crate::value::Value;

fn fields() -> FieldTable {
    FieldTable::new()
        .field("allowed_operations", Value::empty_list())
        .field("backtrace", "")
        .field("created", Value::epoch())
        .field("current_operations", Value::empty_map())
        .field("error_info", Value::empty_list())
        .field("finished", Value::epoch())
        .field("name_description", "")
        .field("name_label", "")
        .field("progress", 0.0)
        .reference("resident_on")
        .field("result", "")
        .field("status", "pending")
        .reference("subtask_of")
        .field("subtasks", Value::empty_list())
        .field("type", "")
        .read_write(&["status"])
}

pub(crate) fn class() -> ApiClass {
    ApiClass::new("task", fields())
        .with_unimplemented(&["set_progress", "set_result", "set_error_info"])
        .with_method(Method::new("create", 2, create))
        .with_method(Method::new("destroy", 1, destroy))
        .with_method(Method::new("cancel", 1, cancel))
}

fn create(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let label = expect_str(arg(args, 0)?, "label")?;
    let description = expect_str(arg(args, 1)?, "description")?;

    let mut record = class.fields().default_record();
    record.insert("name_label".into(), Value::from(label));
    record.insert("name_description".into(), Value::from(description));
    record.insert("allowed_operations".into(), Value::string_list(["cancel", "destroy"]));
    record.insert("backtrace".into(), Value::from("()"));
    record.insert("created".into(), Value::DateTime(Utc::now()));
    record.insert("resident_on".into(), Value::from(api.this_host()));

    let task_ref = class.insert(record)?;
    Ok(Some(Value::String(task_ref)))
}

fn cancel(_api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let task_ref = class.check_ref(arg(args, 0)?)?;
    class.update(task_ref, |record| {
        let cancellable = record
            .get("allowed_operations")
            .and_then(Value::as_array)
            .map(|ops| ops.contains(&Value::from("cancel")))
            .unwrap_or(false);
        if !cancellable {
            return Err(ApiError::operation_not_allowed("Task cannot be cancelled"));
        }
        record.insert("status".into(), Value::from("cancelled"));
        record.insert("finished".into(), Value::DateTime(Utc::now()));
        record.insert("allowed_operations".into(), Value::string_list(["destroy"]));
        Ok(())
    })?;
    Ok(None)
}
