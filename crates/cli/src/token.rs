//! `kpi token` - Drive access token in the system keychain.

use std::io::{self, Write};

use kpiboard_config::secrets::{
    delete_drive_token, get_drive_token, keychain_available, set_drive_token, TOKEN_ENV_VAR,
};

use crate::exit_codes::*;
use crate::report::print_json;
use crate::CliError;

fn keychain_error(msg: String) -> CliError {
    CliError { code: EXIT_KEYCHAIN, message: msg, hint: None }
        .with_hint(format!("set {} instead", TOKEN_ENV_VAR))
}

pub fn cmd_set(token: Option<String>) -> Result<(), CliError> {
    let token = match token {
        Some(t) => t,
        None if atty::is(atty::Stream::Stdin) => {
            eprint!("Drive access token: ");
            io::stderr().flush().ok();
            let mut buf = String::new();
            io::stdin()
                .read_line(&mut buf)
                .map_err(|e| CliError::io(e.to_string()))?;
            buf
        }
        None => {
            return Err(CliError::args("no token given and stdin is not a TTY")
                .with_hint("pass the token as an argument"));
        }
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::args("token is empty"));
    }

    set_drive_token(token).map_err(keychain_error)?;
    eprintln!("token stored in keychain");
    Ok(())
}

pub fn cmd_clear() -> Result<(), CliError> {
    delete_drive_token().map_err(keychain_error)?;
    eprintln!("token removed from keychain");
    Ok(())
}

pub fn cmd_status(json: bool) -> Result<(), CliError> {
    let lookup = get_drive_token();
    let keychain = keychain_available();
    if json {
        return print_json(&serde_json::json!({
            "configured": lookup.token.is_some(),
            "source": lookup.source.as_str(),
            "keychain_available": keychain,
        }));
    }

    match &lookup.token {
        Some(_) => println!("token: configured ({})", lookup.source.as_str()),
        None => println!("token: not configured"),
    }
    println!("keychain: {}", if keychain { "available" } else { "unavailable" });
    if lookup.token.is_none() {
        return Err(CliError {
            code: EXIT_NO_TOKEN,
            message: String::new(),
            hint: Some(format!("run `kpi token set` or set {}", TOKEN_ENV_VAR)),
        });
    }
    Ok(())
}
