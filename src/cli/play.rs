//! Console host for running actions, scripts and dialogs
//!
//! Every custom function referenced by the tables is bound to a console stub
//! that prints its arguments, so resource files can be exercised without a
//! game attached.

use crate::domain::entities::ResourceTables;
use crate::domain::errors::MpalError;
use crate::domain::value_objects::{
    ChoiceId, Command, CustomArgs, DialogId, GroupCommand, GroupId, ItemId, ScriptId,
};
use crate::runtime::{ChoiceWait, FunctionRegistry, Runtime, from_fn};
use std::collections::BTreeSet;
use std::io::{self, Write};

/// Function indices used anywhere in the tables
pub fn referenced_functions(tables: &ResourceTables) -> BTreeSet<u32> {
    let mut indices = BTreeSet::new();
    let mut visit = |command: &Command| {
        if let Command::CustomCall { function, .. } = command {
            indices.insert(function.get());
        }
    };

    for item in &tables.items {
        item.actions.iter().flat_map(|a| &a.commands).for_each(&mut visit);
    }
    for script in &tables.scripts {
        script.moments.iter().flat_map(|m| &m.commands).for_each(&mut visit);
    }
    for dialog in &tables.dialogs {
        for command in dialog.groups.iter().flat_map(|g| &g.commands) {
            if let GroupCommand::CustomCall { function, args } = command {
                visit(&Command::CustomCall {
                    function: *function,
                    args: *args,
                });
            }
        }
    }
    indices
}

/// Console stubs for every referenced function
pub fn console_functions(tables: &ResourceTables) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for index in referenced_functions(tables) {
        registry.register(
            index.into(),
            from_fn(move |runtime: Runtime, args: CustomArgs| async move {
                print_call(&runtime, index, args);
                Ok(())
            }),
        );
    }
    registry
}

fn print_call(runtime: &Runtime, index: u32, args: CustomArgs) {
    println!("  call {index}({}, {}, {}, {})", args[0], args[1], args[2], args[3]);
    let line = u32::try_from(args[0])
        .ok()
        .and_then(|id| runtime.dialog_period(id).or_else(|| runtime.message(id)));
    if let Some(line) = line {
        println!("    \"{line}\"");
    }
}

/// Print a summary of the loaded tables
pub fn run_info(runtime: &Runtime) {
    let tables = runtime.tables();
    println!("=== mpal resource tables ===");
    println!("variables: {}", tables.variables.len());
    println!("messages:  {}", tables.messages.len());
    println!("items:     {}", tables.items.len());
    println!("dialogs:   {}", tables.dialogs.len());
    println!("scripts:   {}", tables.scripts.len());
    println!("locations: {}", tables.locations.len());

    if !tables.items.is_empty() {
        println!();
        println!("items:");
        for item in &tables.items {
            let name = item.name.as_deref().unwrap_or("-");
            let idle = item.actions.iter().filter(|a| a.is_idle()).count();
            println!(
                "  {:>5} {name:<20} actions={} idle={idle}",
                item.id,
                item.actions.len()
            );
        }
    }

    let functions = referenced_functions(tables);
    if !functions.is_empty() {
        let list: Vec<String> = functions.iter().map(u32::to_string).collect();
        println!();
        println!("custom functions: {}", list.join(", "));
    }
}

/// Dispatch one action and wait for it to finish
pub async fn run_action(
    runtime: &Runtime,
    trigger: u32,
    item: ItemId,
    param: u32,
) -> Result<(), MpalError> {
    println!("action {trigger}/{param} on item {item}");
    let handle = runtime.do_action(trigger, item, param)?;
    handle.join().await;
    println!("done ({:?})", handle.state());
    Ok(())
}

/// Run one script to completion
pub async fn run_script(runtime: &Runtime, script: ScriptId) -> Result<(), MpalError> {
    println!("script {script}");
    let handle = runtime.execute_script(script)?;
    handle.join().await;
    println!("done ({:?})", handle.state());
    Ok(())
}

/// Play a dialog, asking on stdin whenever a choice is pending
pub async fn run_dialog(runtime: &Runtime, dialog: DialogId, group: GroupId) -> anyhow::Result<()> {
    println!("=== dialog {dialog} ===");
    runtime.do_dialog(dialog, group)?;

    loop {
        match runtime.wait_for_choice().await {
            ChoiceWait::NoDialog => break,
            ChoiceWait::Choice(choice) => {
                if !ask_choice(runtime, choice).await? {
                    println!("Goodbye!");
                    return Ok(());
                }
            }
        }
    }

    println!();
    println!("== END OF DIALOG ==");
    Ok(())
}

/// Prompt until a valid selection is made; `false` when the user quits
async fn ask_choice(runtime: &Runtime, choice: ChoiceId) -> anyhow::Result<bool> {
    let options = runtime.dialog_select_list(choice);
    println!("--- Choice {choice} ---");
    for (position, data) in options.iter().enumerate() {
        println!("  {}. select {data}", position + 1);
    }

    loop {
        let input = tokio::task::spawn_blocking(|| get_input("Select:")).await??;
        if input == "q" {
            return Ok(false);
        }

        let Some(data) = input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i))
        else {
            println!("Invalid input. Enter 1-{} or 'q'.", options.len());
            continue;
        };

        match runtime.select_choice(choice, *data) {
            Ok(()) => return Ok(true),
            Err(MpalError::InvalidSelection { .. }) => println!("That option is no longer available."),
            Err(err) => return Err(err.into()),
        }
    }
}

/// Get user input with an optional prompt
fn get_input(prompt: &str) -> io::Result<String> {
    if !prompt.is_empty() {
        print!("{} ", prompt);
        io::stdout().flush()?;
    }

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
