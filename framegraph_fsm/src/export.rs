//! Textual descriptions of a programmed [`StateMachine`].
//!
//! `export_dot` renders the transition diagram for graphviz, `export_lts` writes the machine as
//! an FSP process that the LTSA model checker can load.
use crate::{Identifier, StateMachine};
use std::fmt::Debug;
use std::io::Write;

/// Render the machine in the dot format.
/// Self transitions are left out when `skip_loops` is set, they usually are the
/// "invalid request" reactions and clutter the diagram.
pub fn export_dot<S: Identifier, I: Identifier, A: Copy + Debug>(
    machine: &StateMachine<S, I, A>,
    output: &mut dyn Write,
    skip_loops: bool,
) -> std::io::Result<()> {
    writeln!(output, "digraph \"{}\" {{", escape(machine.name()))?;
    writeln!(output, "rankdir=LR;")?;
    writeln!(
        output,
        "node [shape=box, style=\"rounded, filled\", fontname=\"Noto Sans\", color=grey];"
    )?;

    let states: Vec<S> = machine.states().collect();
    for (index, state) in states.iter().enumerate() {
        let fill = if machine.initial_state() == Some(*state) {
            "lightgreen"
        } else {
            "lightgrey"
        };
        writeln!(
            output,
            "{index} [label=\"{}\", fillcolor={fill}];",
            escape(&machine.state_name(*state))
        )?;
    }

    let index_of = |state: S| states.iter().position(|s| *s == state);
    for (state, input, transition) in machine.transitions() {
        if skip_loops && state == transition.next_state {
            continue;
        }
        let (Some(src), Some(dst)) = (index_of(state), index_of(transition.next_state)) else {
            continue;
        };
        writeln!(
            output,
            "{src} -> {dst} [label=< <B>{}</B> / <FONT COLOR=\"gray\">{:?}</FONT> >];",
            escape(&machine.input_name(input)),
            transition.action
        )?;
    }
    writeln!(output, "}}")
}

/// Write the machine as an FSP process for LTSA.
///
/// The initial state process carries the machine name, every other state becomes a local
/// process. Inputs are the actions of the process, in lower camel case as FSP requires.
pub fn export_lts<S: Identifier, I: Identifier, A: Copy + Debug>(
    machine: &StateMachine<S, I, A>,
    output: &mut dyn Write,
    skip_loops: bool,
) -> std::io::Result<()> {
    let initial = machine.initial_state();
    let process_name = |state: S| -> String {
        if Some(state) == initial {
            fsp_process(machine.name())
        } else {
            fsp_process(&machine.state_name(state))
        }
    };

    // The initial state comes first, FSP takes the first process as the main one.
    let mut states: Vec<S> = machine.states().collect();
    if let Some(initial) = initial {
        states.retain(|s| *s != initial);
        states.insert(0, initial);
    }

    let transitions = machine.transitions();
    let count = states.len();
    for (position, state) in states.iter().enumerate() {
        let choices: Vec<String> = transitions
            .iter()
            .filter(|(src, _, transition)| {
                *src == *state && !(skip_loops && *src == transition.next_state)
            })
            .map(|(_, input, transition)| {
                format!(
                    "{} -> {}",
                    fsp_action(&machine.input_name(*input)),
                    process_name(transition.next_state)
                )
            })
            .collect();

        let body = if choices.is_empty() {
            "STOP".to_string()
        } else {
            format!("({})", choices.join("\n\t| "))
        };
        let separator = if position + 1 == count { "." } else { "," };
        writeln!(output, "{} = {}{}", process_name(*state), body, separator)?;
    }
    if count == 0 {
        writeln!(output, "{} = STOP.", fsp_process(machine.name()))?;
    }
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}

/// FSP processes start with an upper case letter and only hold alphanumerics.
fn fsp_process(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => "P".to_string(),
    }
}

/// FSP actions start with a lower case letter.
fn fsp_action(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => "a".to_string(),
    }
}
