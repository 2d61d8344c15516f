//! XML plan documents produced by the sequential planner's prompt.

use once_cell::sync::Lazy;
use promptlang::{FunctionRegistry, GLOBAL_PLUGIN};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

use crate::plan::Plan;

const PLAN_TAG: &str = "plan";
const FUNCTION_TAG: &str = "function.";
const SET_CONTEXT_VARIABLE_TAG: &str = "setContextVariable";
const APPEND_TO_RESULT_TAG: &str = "appendToResult";

static PLAN_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<plan\b[^>]*>(.*?)</plan>").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("failed to parse plan document ({reason}): {text}")]
    Malformed { text: String, reason: String },
    #[error("function '{name}' not found in plugin '{plugin}'")]
    FunctionNotFound { plugin: String, name: String },
    #[error("no steps could be created for the goal from the plan document: {text}")]
    NoSteps { text: String },
}

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    /// First element named `name`, depth first.
    fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|child| {
            if child.name.eq_ignore_ascii_case(name) {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }
}

/// Parses `text` as an element tree below a synthetic document node.
fn parse_document(text: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack = vec![XmlElement::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(XmlElement::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let element = XmlElement::from_start(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err("unexpected closing tag".to_string());
                }
                if let Some(element) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    if stack.len() != 1 {
        return Err("unclosed element".to_string());
    }
    stack.pop().ok_or_else(|| "empty document".to_string())
}

/// Strict parse first, then a lenient pass over the first `<plan>` element.
fn parse_plan_document(text: &str) -> Result<XmlElement, PlanParseError> {
    let strict_error = match parse_document(&format!("<xml>{}</xml>", text)) {
        Ok(document) => return Ok(document),
        Err(reason) => reason,
    };
    log::warn!("plan document is not well formed ({}), retrying with the <plan> element", strict_error);

    let closed = format!("{}</plan>", text);
    let plan_xml = PLAN_ELEMENT
        .find(text)
        .or_else(|| PLAN_ELEMENT.find(&closed))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PlanParseError::Malformed {
            text: text.to_string(),
            reason: strict_error.clone(),
        })?;

    parse_document(&format!("<xml>{}</xml>", plan_xml)).map_err(|reason| {
        PlanParseError::Malformed {
            text: text.to_string(),
            reason,
        }
    })
}

fn split_function_name(qualified: &str) -> (&str, &str) {
    match qualified.split_once('.') {
        Some((plugin, name)) => (plugin, name),
        None => (GLOBAL_PLUGIN, qualified),
    }
}

/// Builds a [`Plan`] for `goal` from a model-written XML plan document.
///
/// Each `<function.plugin.name/>` child of the first `<plan>` element becomes
/// a step. `setContextVariable` names a step output and `appendToResult` names
/// a step output that is also a plan output; every other attribute becomes a
/// step parameter. Unknown functions fail the parse unless `allow_missing`, in
/// which case they become placeholder steps.
pub fn parse_plan(
    text: &str,
    goal: &str,
    registry: &dyn FunctionRegistry,
    allow_missing: bool,
) -> Result<Plan, PlanParseError> {
    let document = parse_plan_document(text)?;
    let mut plan = Plan::new(goal);

    let Some(plan_element) = document.find(PLAN_TAG) else {
        return Err(PlanParseError::NoSteps {
            text: text.to_string(),
        });
    };

    for element in &plan_element.children {
        let Some(qualified) = strip_prefix_ignore_case(&element.name, FUNCTION_TAG) else {
            log::debug!("ignoring <{}> element in plan", element.name);
            continue;
        };
        let (plugin, name) = split_function_name(qualified);

        let mut outputs = Vec::new();
        let mut results = Vec::new();
        let mut step = match registry.resolve(plugin, name) {
            Some(function) => {
                let mut step = Plan::from_function(function.view());
                for parameter in &function.view().parameters {
                    if let Some(default) = &parameter.default_value {
                        step.root_mut().parameters.set(&parameter.name, default.clone());
                    }
                }
                step
            }
            None if allow_missing => {
                log::warn!("plan references unknown function {}.{}", plugin, name);
                Plan::missing_function(plugin, name)
            }
            None => {
                return Err(PlanParseError::FunctionNotFound {
                    plugin: plugin.to_string(),
                    name: name.to_string(),
                })
            }
        };

        for (key, value) in &element.attributes {
            if key.eq_ignore_ascii_case(SET_CONTEXT_VARIABLE_TAG) {
                outputs.push(value.clone());
            } else if key.eq_ignore_ascii_case(APPEND_TO_RESULT_TAG) {
                outputs.push(value.clone());
                results.push(value.clone());
            } else {
                step.root_mut().parameters.set(key, value.clone());
            }
        }

        step.root_mut().outputs = outputs;
        for result in results {
            plan.add_output(result);
        }
        plan.add_step(step);
    }

    if plan.steps().is_empty() {
        return Err(PlanParseError::NoSteps {
            text: text.to_string(),
        });
    }
    Ok(plan)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::builtin::register_builtin_plugins;
    use crate::functions::FunctionCatalog;
    use pretty_assertions::assert_eq;

    fn catalog() -> FunctionCatalog {
        let mut catalog = FunctionCatalog::new();
        register_builtin_plugins(&mut catalog);
        catalog
    }

    #[test]
    fn test_parses_steps_parameters_and_outputs() {
        let text = r#"<plan>
    <!-- add the numbers -->
    <function.math.Add input="1" amount="2" setContextVariable="SUM"/>
    <function.text.uppercase input="$SUM" appendToResult="RESULT__UPPER"/>
</plan><!-- END -->"#;
        let plan = parse_plan(text, "add", &catalog(), false).unwrap();

        assert_eq!(plan.steps().len(), 2);
        let first = plan.node(plan.steps()[0]).unwrap();
        assert_eq!(first.plugin_name, "math");
        assert_eq!(first.name, "Add");
        assert_eq!(first.parameters.get("amount"), Some("2"));
        assert_eq!(first.outputs, vec!["SUM".to_string()]);

        let second = plan.node(plan.steps()[1]).unwrap();
        assert_eq!(second.parameters.input(), "$SUM");
        assert_eq!(plan.root().outputs, vec!["RESULT__UPPER".to_string()]);
        assert_eq!(plan.description(), "add");
    }

    #[test]
    fn test_unknown_attribute_becomes_parameter() {
        let plan = parse_plan(
            r#"<plan><function.math.Add input="1" number="2"/></plan>"#,
            "g",
            &catalog(),
            false,
        )
        .unwrap();
        let step = plan.node(plan.steps()[0]).unwrap();
        assert_eq!(step.parameters.get("number"), Some("2"));
    }

    #[test]
    fn test_recovers_plan_from_surrounding_noise() {
        let text = "Sure, here is the plan:\n<plan>\n<function.text.trim input=\" x \"/>\n</plan>\nand <unclosed";
        let plan = parse_plan(text, "g", &catalog(), false).unwrap();
        assert_eq!(plan.steps().len(), 1);
    }

    #[test]
    fn test_recovers_plan_missing_closing_tag() {
        let text = "<plan>\n<function.text.trim input=\"x\"/>";
        let plan = parse_plan(text, "g", &catalog(), false).unwrap();
        assert_eq!(plan.steps().len(), 1);
    }

    #[test]
    fn test_only_first_plan_is_used() {
        let text = r#"<plan><function.text.trim/></plan><plan><function.text.uppercase/><function.text.lowercase/></plan>"#;
        let plan = parse_plan(text, "g", &catalog(), false).unwrap();
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.node(plan.steps()[0]).unwrap().name, "trim");
    }

    #[test]
    fn test_unknown_function_fails_or_becomes_placeholder() {
        let text = r#"<plan><function.email.send to="bob"/></plan>"#;
        assert_eq!(
            parse_plan(text, "g", &catalog(), false).unwrap_err(),
            PlanParseError::FunctionNotFound {
                plugin: "email".to_string(),
                name: "send".to_string()
            }
        );

        let plan = parse_plan(text, "g", &catalog(), true).unwrap();
        let step = plan.node(plan.steps()[0]).unwrap();
        assert!(step.is_placeholder());
        assert_eq!(step.parameters.get("to"), Some("bob"));
    }

    #[test]
    fn test_function_without_plugin_is_global() {
        let mut catalog = catalog();
        catalog.register_native(
            crate::functions::NativeFunction::builder(GLOBAL_PLUGIN, "greet")
                .build_sync(|args| Ok(format!("hi {}", args.input()))),
        );
        let plan = parse_plan("<plan><function.greet/></plan>", "g", &catalog, false).unwrap();
        assert_eq!(plan.node(plan.steps()[0]).unwrap().name, "greet");
    }

    #[test]
    fn test_empty_and_garbage_documents() {
        assert!(matches!(
            parse_plan("<plan />", "g", &catalog(), false),
            Err(PlanParseError::NoSteps { .. })
        ));
        assert!(matches!(
            parse_plan("I cannot help with that", "g", &catalog(), false),
            Err(PlanParseError::NoSteps { .. })
        ));
        assert!(matches!(
            parse_plan("<a><b></a>", "g", &catalog(), false),
            Err(PlanParseError::Malformed { .. })
        ));
    }
}
