#![warn(rust_2018_idioms)]
use colored::Colorize;
use kv_model::config::ShellConfig;
use kv_model::shell::{Command, Shell};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::error::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let config = ShellConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter)?)
        .init();

    let shell = Shell::new(config.table);
    info!(timestamped = config.table.timestamped, "kv-model shell started");

    let mut editor = DefaultEditor::new()?;
    if let Some(history) = &config.history {
        // 第一次运行时历史文件还不存在
        if editor.load_history(history).is_err() {
            info!(path = %history.display(), "no history file yet");
        }
    }

    loop {
        let readline = editor.readline("kv-model>> ");
        match readline {
            Ok(line) => {  // 正常情况，拿到一条命令
                let line = line.trim();  // 去除空格
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                let command = match Command::parse(line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e.to_string().red());
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }
                match shell.execute(command) {
                    Ok(output) => println!("{}", output.green()),
                    Err(e) => println!("{} (code {})", e.to_string().red(), e.code()),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(history) = &config.history {
        if let Err(e) = editor.save_history(history) {
            warn!(path = %history.display(), error = %e, "failed to save history");
        }
    }
    Ok(())
}
