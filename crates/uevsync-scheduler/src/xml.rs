//! Task Scheduler XML definitions.
//!
//! New tasks are rendered from a [`TaskDescriptor`]. Registered tasks are
//! only ever edited through [`rewrite_exec_action`], which replaces the
//! `Command` and `Arguments` of the first `Exec` action and passes every
//! other event through untouched.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

use crate::{SchedulerError, TaskAction, TaskDescriptor};

/// Namespace of Task Scheduler definitions.
pub const TASK_NAMESPACE: &str = "http://schemas.microsoft.com/windows/2004/02/mit/task";

const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n";
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];

#[derive(Serialize)]
#[serde(rename = "Task")]
struct TaskXml<'a> {
    #[serde(rename = "@version")]
    version: &'a str,
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "RegistrationInfo")]
    registration_info: RegistrationInfoXml<'a>,
    #[serde(rename = "Triggers")]
    triggers: TriggersXml,
    #[serde(rename = "Principals")]
    principals: PrincipalsXml<'a>,
    #[serde(rename = "Settings")]
    settings: SettingsXml,
    #[serde(rename = "Actions")]
    actions: ActionsXml<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegistrationInfoXml<'a> {
    #[serde(rename = "URI")]
    uri: String,
    description: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TriggersXml {
    calendar_trigger: CalendarTriggerXml,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CalendarTriggerXml {
    start_boundary: String,
    enabled: bool,
    schedule_by_day: ScheduleByDayXml,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScheduleByDayXml {
    days_interval: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PrincipalsXml<'a> {
    principal: PrincipalXml<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PrincipalXml<'a> {
    #[serde(rename = "@id")]
    id: &'a str,
    user_id: &'a str,
    run_level: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SettingsXml {
    multiple_instances_policy: &'static str,
    disallow_start_if_on_batteries: bool,
    stop_if_going_on_batteries: bool,
    run_only_if_network_available: bool,
    enabled: bool,
    hidden: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ActionsXml<'a> {
    #[serde(rename = "@Context")]
    context: &'a str,
    exec: ExecXml<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecXml<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<&'a str>,
}

/// Render a complete task definition for registration.
pub fn render_task(descriptor: &TaskDescriptor) -> Result<String, SchedulerError> {
    let document = TaskXml {
        version: descriptor.settings.compatibility.schema_version(),
        xmlns: TASK_NAMESPACE,
        registration_info: RegistrationInfoXml {
            uri: descriptor.full_name(),
            description: "Downloads the UE-V configuration script and runs it daily.",
        },
        triggers: TriggersXml {
            calendar_trigger: CalendarTriggerXml {
                start_boundary: descriptor.trigger.start_boundary(),
                enabled: true,
                schedule_by_day: ScheduleByDayXml { days_interval: 1 },
            },
        },
        principals: PrincipalsXml {
            principal: PrincipalXml {
                id: "Author",
                user_id: &descriptor.principal.user_id,
                run_level: descriptor.principal.run_level.as_str(),
            },
        },
        settings: SettingsXml {
            multiple_instances_policy: "IgnoreNew",
            disallow_start_if_on_batteries: !descriptor.settings.allow_start_on_batteries,
            stop_if_going_on_batteries: descriptor.settings.stop_if_going_on_batteries,
            run_only_if_network_available: descriptor.settings.run_only_if_network_available,
            enabled: true,
            hidden: descriptor.settings.hidden,
        },
        actions: ActionsXml {
            context: "Author",
            exec: ExecXml {
                command: &descriptor.action.executable,
                arguments: Some(descriptor.action.arguments.as_str()).filter(|a| !a.is_empty()),
            },
        },
    };

    let body = quick_xml::se::to_string(&document)
        .map_err(|e| SchedulerError::InvalidDefinition(e.to_string()))?;
    Ok(format!("{DECLARATION}{body}"))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ExecField {
    Command,
    Arguments,
}

impl ExecField {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Command" => Some(ExecField::Command),
            b"Arguments" => Some(ExecField::Arguments),
            _ => None,
        }
    }
}

fn parent_is(path: &[Vec<u8>], name: &[u8]) -> bool {
    path.last().is_some_and(|last| last.as_slice() == name)
}

fn text_of(text: &BytesText<'_>) -> Result<String, SchedulerError> {
    text.unescape()
        .map(|s| s.into_owned())
        .map_err(|e| SchedulerError::InvalidDefinition(e.to_string()))
}

/// Read the first `Exec` action of a task definition.
///
/// Returns `None` when the definition has no `Exec` action.
pub fn read_exec_action(xml: &str) -> Result<Option<TaskAction>, SchedulerError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut in_exec = false;
    let mut field: Option<ExecField> = None;
    let mut command = String::new();
    let mut arguments = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if !in_exec && name == b"Exec" && parent_is(&path, b"Actions") {
                    in_exec = true;
                } else if in_exec && parent_is(&path, b"Exec") {
                    field = ExecField::from_name(&name);
                }
                path.push(name);
            }
            Event::Text(t) => match field {
                Some(ExecField::Command) => command.push_str(&text_of(&t)?),
                Some(ExecField::Arguments) => arguments.push_str(&text_of(&t)?),
                None => {}
            },
            Event::CData(c) => match field {
                Some(ExecField::Command) => command.push_str(&String::from_utf8_lossy(&c)),
                Some(ExecField::Arguments) => arguments.push_str(&String::from_utf8_lossy(&c)),
                None => {}
            },
            Event::End(e) => {
                path.pop();
                field = None;
                if in_exec && e.local_name().as_ref() == b"Exec" && parent_is(&path, b"Actions") {
                    return Ok(Some(TaskAction {
                        executable: command,
                        arguments,
                    }));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RewriteState {
    BeforeExec,
    InExec { seen_arguments: bool },
    Done,
}

/// Replace the first `Exec` action's command line, keeping the rest of the
/// definition as it was.
pub fn rewrite_exec_action(xml: &str, action: &TaskAction) -> Result<String, SchedulerError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut state = RewriteState::BeforeExec;
    // Depth inside an element whose original content is being dropped
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event()?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(end) => {
                    skip_depth -= 1;
                    if skip_depth == 0 {
                        path.pop();
                        writer.write_event(Event::End(end))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                match state {
                    RewriteState::BeforeExec if name == b"Exec" && parent_is(&path, b"Actions") => {
                        state = RewriteState::InExec {
                            seen_arguments: false,
                        };
                        writer.write_event(Event::Start(start))?;
                    }
                    RewriteState::InExec { .. } if parent_is(&path, b"Exec") => {
                        match ExecField::from_name(&name) {
                            Some(field) => {
                                if field == ExecField::Arguments {
                                    state = RewriteState::InExec {
                                        seen_arguments: true,
                                    };
                                }
                                writer.write_event(Event::Start(start))?;
                                writer.write_event(Event::Text(BytesText::new(value_of(
                                    action, field,
                                ))))?;
                                skip_depth = 1;
                            }
                            None => writer.write_event(Event::Start(start))?,
                        }
                    }
                    _ => writer.write_event(Event::Start(start))?,
                }
                path.push(name);
            }
            Event::Empty(empty) => {
                let field = match state {
                    RewriteState::InExec { .. } if parent_is(&path, b"Exec") => {
                        ExecField::from_name(empty.local_name().as_ref())
                    }
                    _ => None,
                };
                match field {
                    Some(field) => {
                        if field == ExecField::Arguments {
                            state = RewriteState::InExec {
                                seen_arguments: true,
                            };
                        }
                        let end = empty.to_end().into_owned();
                        writer.write_event(Event::Start(empty))?;
                        writer.write_event(Event::Text(BytesText::new(value_of(action, field))))?;
                        writer.write_event(Event::End(end))?;
                    }
                    None => writer.write_event(Event::Empty(empty))?,
                }
            }
            Event::End(end) => {
                path.pop();
                if let RewriteState::InExec { seen_arguments } = state {
                    if end.local_name().as_ref() == b"Exec" && parent_is(&path, b"Actions") {
                        if !seen_arguments && !action.arguments.is_empty() {
                            writer.write_event(Event::Start(BytesStart::new("Arguments")))?;
                            writer.write_event(Event::Text(BytesText::new(&action.arguments)))?;
                            writer.write_event(Event::End(BytesEnd::new("Arguments")))?;
                        }
                        state = RewriteState::Done;
                    }
                }
                writer.write_event(Event::End(end))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if state != RewriteState::Done {
        return Err(SchedulerError::MissingExecAction);
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| SchedulerError::InvalidDefinition(e.to_string()))
}

fn value_of(action: &TaskAction, field: ExecField) -> &str {
    match field {
        ExecField::Command => &action.executable,
        ExecField::Arguments => &action.arguments,
    }
}

/// Encode a definition the way `schtasks /xml` expects it: UTF-16LE with BOM.
pub fn encode_utf16(document: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + document.len() * 2);
    bytes.extend_from_slice(&UTF16_LE_BOM);
    for unit in document.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Decode console output that may be UTF-16LE (with or without BOM) or
/// an 8-bit code page.
pub fn decode_output(bytes: &[u8]) -> String {
    let utf16 = match bytes {
        [0xFF, 0xFE, rest @ ..] => Some(rest),
        [_, 0, ..] => Some(bytes),
        _ => None,
    };

    match utf16 {
        Some(body) => {
            let units = body
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}
