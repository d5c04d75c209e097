//! The simulated XenAPI service and its method dispatcher.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::class::ApiClass;
use crate::classes::{self, Seed};
use crate::envelope::Envelope;
use crate::error::{ApiError, Result};
use crate::method::SessionUse;
use crate::session::SessionManager;
use crate::settings::SimulatorSettings;
use crate::value::Value;

/// All classes of the simulated service plus the session manager.
#[derive(Debug)]
pub struct XenApi {
    classes: BTreeMap<&'static str, ApiClass>,
    sessions: SessionManager,
    this_host: String,
}

impl XenApi {
    /// Build the service with its seed records (this host, its pool, dom0,
    /// local storage, the internal management network and one disk).
    pub fn new(settings: &SimulatorSettings) -> Result<Self> {
        let seed = Seed::new();

        let classes = classes::all(&seed)?
            .into_iter()
            .map(|class| (class.name(), class))
            .collect::<BTreeMap<_, _>>();

        info!(
            this_host = %seed.this_host,
            classes = classes.len(),
            "Simulated XenAPI service ready"
        );

        Ok(Self {
            classes,
            sessions: SessionManager::new(
                &settings.root_password,
                &seed.this_host,
                settings.idle_timeout(),
            ),
            this_host: seed.this_host,
        })
    }

    /// Reference of the host this service pretends to run on.
    pub fn this_host(&self) -> &str {
        &self.this_host
    }

    pub fn class(&self, name: &str) -> Option<&ApiClass> {
        self.classes.get(name)
    }

    /// A class hand-written methods depend on; its absence is a bug.
    pub fn require_class(&self, name: &str) -> Result<&ApiClass> {
        self.class(name)
            .ok_or_else(|| ApiError::internal(format!("class {} is not registered", name)))
    }

    pub fn class_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.keys().copied()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run one expiry pass as seen at `now`.
    pub fn expire_sessions(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let sessions = self.require_class("session")?;
        self.sessions.expire_idle(sessions, now)
    }

    /// Handle one remote call. Never fails: every fault ends up in the
    /// returned envelope.
    #[instrument(skip(self, params), fields(method = %method_name, params = params.len()))]
    pub fn dispatch(&self, method_name: &str, params: &[Value]) -> Envelope {
        let result = self.call(method_name, params);
        if let Err(ref e) = result {
            debug!(error = %e, "Call failed");
        }
        Envelope::from(result)
    }

    fn call(&self, method_name: &str, params: &[Value]) -> Result<Option<Value>> {
        let parts: Vec<&str> = method_name.split('.').collect();
        let (class_name, op_name) = match parts.as_slice() {
            [class_name, op_name] => (*class_name, *op_name),
            _ => return Err(ApiError::method_unknown(method_name)),
        };
        let class = self
            .class(class_name)
            .ok_or_else(|| ApiError::method_unknown(method_name))?;

        let operation = class.resolve(op_name)?;
        let session_use = operation.session_use();

        let supplied = match session_use {
            SessionUse::Implicit => params.len() as isize - 1,
            SessionUse::None | SessionUse::Consumed => params.len() as isize,
        };
        let arity = operation.arity();
        if !arity.accepts(supplied) {
            return Err(ApiError::parameter_count_mismatch(
                method_name,
                arity.declared(),
                supplied,
            ));
        }

        let args = match session_use {
            SessionUse::None => params,
            SessionUse::Implicit => {
                self.authenticate(&params[0])?;
                &params[1..]
            }
            SessionUse::Consumed => {
                self.authenticate(&params[0])?;
                params
            }
        };

        operation.invoke(self, class, args)
    }

    fn authenticate(&self, token: &Value) -> Result<()> {
        let sessions = self.require_class("session")?;
        self.sessions.authenticate(sessions, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> XenApi {
        XenApi::new(&SimulatorSettings::default()).unwrap()
    }

    fn login(api: &XenApi) -> Value {
        api.dispatch(
            "session.login_with_password",
            &[Value::from("root"), Value::from("xenserver")],
        )
        .into_value()
        .unwrap()
    }

    #[test]
    fn test_malformed_method_names() {
        let api = api();
        for name in ["VM", "VM.get_all.extra", "Nope.get_all", ""] {
            let envelope = api.dispatch(name, &[]);
            assert_eq!(envelope.error_code(), Some("MESSAGE_METHOD_UNKNOWN"), "{}", name);
        }
    }

    #[test]
    fn test_count_mismatch_reports_supplied_without_token() {
        let api = api();
        let envelope = api.dispatch("VM.get_name_label", &[]);
        assert_eq!(
            envelope,
            Envelope::Failure {
                error_description: vec![
                    "MESSAGE_PARAMETER_COUNT_MISMATCH".into(),
                    "VM.get_name_label".into(),
                    "1".into(),
                    "-1".into(),
                ]
            }
        );
    }

    #[test]
    fn test_session_checked_after_arity() {
        let api = api();
        let envelope = api.dispatch("VM.get_all", &[Value::Int(5)]);
        assert_eq!(envelope.error_code(), Some("FIELD_TYPE_ERROR"));

        let envelope = api.dispatch("VM.get_all", &[Value::from("OpaqueRef:stale")]);
        assert_eq!(envelope.error_code(), Some("SESSION_INVALID"));
    }

    #[test]
    fn test_token_is_stripped() {
        let api = api();
        let session = login(&api);
        let envelope = api.dispatch("VM.echo", &[session, Value::from("ping")]);
        assert_eq!(envelope.into_value(), Some(Value::from("ping")));
    }

    #[test]
    fn test_expire_sessions() {
        let api = api();
        let session = login(&api);
        let expired = api
            .expire_sessions(Utc::now() + chrono::Duration::hours(25))
            .unwrap();
        assert_eq!(expired.len(), 1);
        let envelope = api.dispatch("session.get_all", &[session]);
        assert_eq!(envelope.error_code(), Some("SESSION_INVALID"));
    }
}
