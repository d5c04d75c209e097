//! XML-RPC wire codec.
//!
//! Requests are read with quick-xml into a small element tree and then
//! mapped onto [`Value`]s. Responses are written directly as text.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use xapisim_core::value::{format_datetime, parse_datetime};
use xapisim_core::{Record, Value};

/// Fault code for requests that could not be decoded.
pub const PARSE_ERROR: i64 = -32700;

/// Fault code for responses that could not be encoded.
pub const INTERNAL_ERROR: i64 = -32603;

/// Errors raised while decoding or encoding XML-RPC documents.
#[derive(Error, Debug)]
pub enum XmlRpcError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Invalid {kind} value: {text:?}")]
    InvalidValue { kind: &'static str, text: String },

    #[error("Cannot encode non-finite double {0}")]
    NonFinite(f64),
}

/// A decoded `methodCall`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(raw: &[u8]) -> Result<Self, XmlRpcError> {
        let name = std::str::from_utf8(raw)
            .map_err(|e| XmlRpcError::Malformed(e.to_string()))?
            .to_string();
        Ok(Self {
            name,
            ..Self::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Element, XmlRpcError> {
        self.child(name).ok_or_else(|| {
            XmlRpcError::Malformed(format!("<{}> without <{}>", self.name, name))
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlRpcError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlRpcError::Malformed("multiple root elements".into())),
    }
    Ok(())
}

fn parse_document(xml: &str) -> Result<Element, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element::named(e.name().as_ref())?),
            Event::Empty(e) => {
                let element = Element::named(e.name().as_ref())?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = std::str::from_utf8(&e)
                        .map_err(|err| XmlRpcError::Malformed(err.to_string()))?;
                    top.text.push_str(text);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlRpcError::Malformed("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlRpcError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| XmlRpcError::Malformed("empty document".into()))
}

/// Decode a `methodCall` document.
pub fn decode_call(xml: &str) -> Result<MethodCall, XmlRpcError> {
    let root = parse_document(xml)?;
    if root.name != "methodCall" {
        return Err(XmlRpcError::Malformed(format!(
            "expected <methodCall>, found <{}>",
            root.name
        )));
    }

    let method_name = root.require("methodName")?.text.trim().to_string();
    let params = match root.child("params") {
        Some(params) => params
            .children_named("param")
            .map(|param| decode_value(param.require("value")?))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(MethodCall {
        method_name,
        params,
    })
}

fn invalid(kind: &'static str, text: &str) -> XmlRpcError {
    XmlRpcError::InvalidValue {
        kind,
        text: text.to_string(),
    }
}

fn decode_value(value: &Element) -> Result<Value, XmlRpcError> {
    // Untyped content is a string.
    let Some(typed) = value.children.first() else {
        return Ok(Value::String(value.text.clone()));
    };

    let text = typed.text.as_str();
    match typed.name.as_str() {
        "string" => Ok(Value::String(text.to_string())),
        "int" | "i4" | "i8" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| invalid("int", text)),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean", text)),
        },
        // XML-RPC doubles have no NaN or infinity.
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .map(Value::Double)
            .ok_or_else(|| invalid("double", text)),
        "dateTime.iso8601" => parse_datetime(text)
            .map(Value::DateTime)
            .ok_or_else(|| invalid("dateTime.iso8601", text)),
        "base64" => Ok(Value::String(text.trim().to_string())),
        "nil" => Ok(Value::Nil),
        "array" => {
            let items = match typed.child("data") {
                Some(data) => data
                    .children_named("value")
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(items))
        }
        "struct" => {
            let mut fields = Record::new();
            for member in typed.children_named("member") {
                let name = member.require("name")?.text.clone();
                let value = decode_value(member.require("value")?)?;
                fields.insert(name, value);
            }
            Ok(Value::Struct(fields))
        }
        other => Err(XmlRpcError::Malformed(format!("unsupported value type <{}>", other))),
    }
}

fn encode_value(value: &Value, out: &mut String) -> Result<(), XmlRpcError> {
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        Value::Double(d) if !d.is_finite() => return Err(XmlRpcError::NonFinite(*d)),
        Value::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
        Value::DateTime(dt) => out.push_str(&format!(
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            format_datetime(dt)
        )),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                out.push_str("<value>");
                encode_value(item, out)?;
                out.push_str("</value>");
            }
            out.push_str("</data></array>");
        }
        Value::Struct(fields) => {
            out.push_str("<struct>");
            for (name, field) in fields {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name><value>");
                encode_value(field, out)?;
                out.push_str("</value></member>");
            }
            out.push_str("</struct>");
        }
    }
    Ok(())
}

/// Encode a `methodResponse` carrying one value.
pub fn encode_response(value: &Value) -> Result<String, XmlRpcError> {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param><value>");
    encode_value(value, &mut out)?;
    out.push_str("</value></param></params></methodResponse>\n");
    Ok(out)
}

/// Encode a `methodResponse` fault.
pub fn encode_fault(code: i64, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><int>{}</int></value></member>\
         <member><name>faultString</name><value><string>{}</string></value></member>\
         </struct></value></fault></methodResponse>\n",
        code,
        escape(message)
    )
}

/// Encode a `methodCall`, as a client would send it.
pub fn encode_call(method_name: &str, params: &[Value]) -> Result<String, XmlRpcError> {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method_name));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param><value>");
        encode_value(param, &mut out)?;
        out.push_str("</value></param>");
    }
    out.push_str("</params></methodCall>\n");
    Ok(out)
}

/// Decode a `methodResponse`: its value, or the fault code and string.
pub fn decode_response(xml: &str) -> Result<Result<Value, (i64, String)>, XmlRpcError> {
    let root = parse_document(xml)?;
    if root.name != "methodResponse" {
        return Err(XmlRpcError::Malformed(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let fault = decode_value(fault.require("value")?)?;
        let fields = fault
            .as_struct()
            .ok_or_else(|| XmlRpcError::Malformed("fault is not a struct".into()))?;
        let code = fields.get("faultCode").and_then(Value::as_int).unwrap_or_default();
        let message = fields
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Err((code, message)));
    }

    let value = root
        .require("params")?
        .require("param")?
        .require("value")?;
    Ok(Ok(decode_value(value)?))
}
