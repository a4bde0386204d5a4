use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

mod cli_style;

use cli_style::{error_line, heading, permission_line, role_line, shell_styles};
use srms_server::user::{SqliteUserStore, UserManager, UserRole, DEFAULT_TOKEN_TTL};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=shell_styles())]
struct CliArgs {
    /// Path to user.db. Searched for in /data/db and the working directory if omitted.
    #[clap(value_parser = parse_path)]
    pub path: Option<PathBuf>,
}

#[derive(Parser)]
#[command(styles=shell_styles(), name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user with the given handle and role.
    AddUser { user_handle: String, role: String },

    /// Creates a password authentication for the given user.
    /// Fails if the user already has a password set.
    AddLogin {
        user_handle: String,
        password: String,
    },

    /// Change the password of a user, fails if no password was set.
    UpdateLogin {
        user_handle: String,
        password: String,
    },

    /// Deletes the password authentication for a given user.
    DeleteLogin { user_handle: String },

    /// Replaces the role of a user.
    SetRole { user_handle: String, role: String },

    /// Shows role, permissions and tokens of a given user.
    Show { user_handle: String },

    /// Verifies the password of a given user without issuing a token.
    CheckPassword {
        user_handle: String,
        password: String,
    },

    /// Shows all users and their roles.
    Users,

    /// Shows all available roles and their permissions.
    ListRoles,

    /// Shows the path of the current auth db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn parse_role(role: &str) -> Result<UserRole, String> {
    UserRole::from_str(role).ok_or_else(|| {
        let valid = UserRole::ALL
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("Invalid role '{}'. Valid roles are: {}", role, valid)
    })
}

fn show_user(user_manager: &UserManager, user_handle: &str) -> Result<()> {
    let actor = user_manager
        .get_user_by_handle(user_handle)?
        .with_context(|| format!("User {} not found", user_handle))?;
    println!("User: {} (id {})", actor.handle, actor.user_id);
    println!("{}", role_line(actor.role));
    println!("{}", heading("Permissions:"));
    for permission in actor.role.permissions() {
        println!("{}", permission_line(*permission));
    }

    let has_password = user_manager
        .get_user_credentials(user_handle)?
        .and_then(|c| c.username_password)
        .is_some();
    println!("Password set: {}", has_password);

    println!("\n{}", heading("Auth Tokens:"));
    for token in user_manager.get_user_tokens(user_handle)? {
        println!("{:#?}", token);
    }
    Ok(())
}

fn execute_command(
    line: String,
    user_manager: &UserManager,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    let cli = match cli {
        Ok(cli) => cli,
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
            return CommandExecutionResult::Ok;
        }
    };

    println!("{} {}", PROMPT, &line);
    let outcome = match cli.command {
        InnerCommand::AddUser { user_handle, role } => match parse_role(&role) {
            Ok(role) => user_manager.add_user(&user_handle, role).map(|id| {
                println!("Created user {} with id {}", user_handle, id);
            }),
            Err(msg) => return CommandExecutionResult::Error(msg),
        },
        InnerCommand::AddLogin {
            user_handle,
            password,
        } => user_manager.create_password_credentials(&user_handle, &password),
        InnerCommand::UpdateLogin {
            user_handle,
            password,
        } => user_manager.update_password_credentials(&user_handle, &password),
        InnerCommand::DeleteLogin { user_handle } => {
            user_manager.delete_password_credentials(&user_handle)
        }
        InnerCommand::SetRole { user_handle, role } => match parse_role(&role) {
            Ok(role) => user_manager.set_user_role(&user_handle, role).map(|_| {
                println!("User '{}' is now {}", user_handle, role);
            }),
            Err(msg) => return CommandExecutionResult::Error(msg),
        },
        InnerCommand::Show { user_handle } => show_user(user_manager, &user_handle),
        InnerCommand::CheckPassword {
            user_handle,
            password,
        } => {
            let password_credentials = match user_manager.get_user_credentials(&user_handle) {
                Ok(Some(credentials)) => credentials.username_password,
                Ok(None) => {
                    return CommandExecutionResult::Error(format!(
                        "User {} not found.",
                        user_handle
                    ))
                }
                Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
            };
            let password_credentials = match password_credentials {
                Some(x) => x,
                None => {
                    return CommandExecutionResult::Error(format!(
                        "User {} has no password set.",
                        user_handle
                    ));
                }
            };
            password_credentials.verify(&password).map(|correct| {
                if correct {
                    println!("The password provided is correct!");
                } else {
                    println!("Wrong password.");
                }
            })
        }
        InnerCommand::Users => user_manager.get_all_users().map(|users| {
            for user in users {
                println!("{:>5}  {:<24} {}", user.user_id, user.handle, user.role);
            }
        }),
        InnerCommand::ListRoles => {
            println!("{}\n", heading("Available Roles:"));
            for role in UserRole::ALL {
                println!("{}", role_line(role));
                println!("{}", heading("Permissions:"));
                for permission in role.permissions() {
                    println!("{}", permission_line(*permission));
                }
                println!();
            }
            Ok(())
        }
        InnerCommand::Where => {
            println!("{}", db_path);
            Ok(())
        }
        InnerCommand::Exit => return CommandExecutionResult::Exit,
    };

    match outcome {
        Ok(()) => CommandExecutionResult::Ok,
        Err(err) => CommandExecutionResult::Error(format!("{:#}", err)),
    }
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let auth_store_file_path = match cli_args.path {
        Some(path) => path,
        None => SqliteUserStore::infer_path().with_context(|| {
            "Could not infer UserStore DB file path, please specify it explicitly."
        })?,
    };
    let user_store = Arc::new(SqliteUserStore::new(&auth_store_file_path)?);
    let user_manager = UserManager::new(user_store, DEFAULT_TOKEN_TTL);

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(MyHelper::new()));

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(
                    line,
                    &user_manager,
                    auth_store_file_path.display().to_string(),
                ) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        eprintln!("{}", error_line(&err));
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
