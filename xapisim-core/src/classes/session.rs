//! `session` class.

use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::method::Method;
use crate::params::{arg, expect_str, opt_arg};
use crate::session::session_fields;
use crate::value::Value;

pub(crate) fn class() -> ApiClass {
    ApiClass::new("session", session_fields())
        .with_unimplemented(&["create_from_db_file", "logout_subject_identifier"])
        // user, password, [version, originator]
        .with_method(Method::new("login_with_password", 4, login_with_password).with_optional(2))
        .with_method(Method::new("slave_local_login_with_password", 2, slave_local_login_with_password))
        .with_method(Method::new("logout", 1, logout))
        .with_method(Method::new("local_logout", 1, logout))
        .with_method(Method::new("change_password", 2, change_password))
        .with_method(Method::new("get_all_subject_identifiers", 0, get_all_subject_identifiers))
}

fn login_with_password(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let user_name = expect_str(arg(args, 0)?, "user_name")?;
    let password = expect_str(arg(args, 1)?, "user_pwd")?;
    if let Some(version) = opt_arg(args, 2) {
        expect_str(version, "version")?;
    }
    let originator = match opt_arg(args, 3) {
        Some(value) => expect_str(value, "originator")?,
        None => "",
    };

    let session_ref = api.sessions().login(class, user_name, password, originator)?;
    Ok(Some(Value::String(session_ref)))
}

fn slave_local_login_with_password(
    api: &XenApi,
    class: &ApiClass,
    args: &[Value],
) -> Result<Option<Value>> {
    let user_name = expect_str(arg(args, 0)?, "user_name")?;
    let password = expect_str(arg(args, 1)?, "user_pwd")?;
    let session_ref = api.sessions().login(class, user_name, password, "")?;
    Ok(Some(Value::String(session_ref)))
}

fn logout(api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    let session_ref = expect_str(arg(args, 0)?, "session_id")?;
    api.sessions().logout(class, session_ref)?;
    Ok(None)
}

fn change_password(api: &XenApi, _class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
    // The old password is type-checked but not compared.
    expect_str(arg(args, 0)?, "old_pwd")?;
    let new_password = expect_str(arg(args, 1)?, "new_pwd")?;
    api.sessions().change_password(new_password)?;
    Ok(None)
}

fn get_all_subject_identifiers(
    _api: &XenApi,
    _class: &ApiClass,
    _args: &[Value],
) -> Result<Option<Value>> {
    Ok(Some(Value::empty_list()))
}
