//! CLI command definitions and handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use passvault::{
    App, OperationState, PasswordPolicy, PinPolicy, RecordId, RecordInput, SecretRecord,
};
use zeroize::Zeroizing;

/// passvault - A command-line client for a remote password vault
#[derive(Parser)]
#[command(name = "passvault")]
#[command(version)]
#[command(about = "Store, reveal and generate secrets in a remote vault")]
#[command(long_about = "Store, reveal and generate secrets in a remote vault.\n\n\
    Secrets stay encrypted on the server. Listing and showing a record only\n\
    prints its metadata; the plaintext is fetched when you ask for it with\n\
    `reveal`.\n\n\
    The server address comes from config.toml or PASSVAULT_URL.")]
#[command(after_help = "EXAMPLES:\n\
    passvault login alice\n\
    passvault list\n\
    passvault add GitHub --username alice --category Work\n\
    passvault reveal 7\n\
    passvault generate password --length 20 --no-symbols\n\
    passvault delete 7")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and log in
    Register {
        username: String,

        email: String,

        /// Master password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Log in and store the session
    Login {
        username: String,

        /// Master password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Whoami {
        /// Output as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List stored records (no secrets)
    List {
        /// Only records in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Output as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show one record's metadata
    Show {
        id: RecordId,

        /// Output as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Decrypt and print one record's secret
    Reveal { id: RecordId },

    /// Generate a password or PIN on the server
    Generate {
        #[command(subcommand)]
        kind: GenerateKind,
    },

    /// Store a new record
    Add {
        label: String,

        #[command(flatten)]
        fields: RecordFields,
    },

    /// Change a record; fields left out keep their current value
    Edit {
        id: RecordId,

        /// New label
        #[arg(long)]
        label: Option<String>,

        #[command(flatten)]
        fields: RecordFields,
    },

    /// Delete a record
    Delete { id: RecordId },

    /// List the category vocabulary
    Categories {
        /// Output as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum GenerateKind {
    /// Generate a password
    Password {
        #[arg(short, long, default_value = "12")]
        length: u32,

        #[arg(long, default_value = "false")]
        no_uppercase: bool,

        #[arg(long, default_value = "false")]
        no_lowercase: bool,

        #[arg(long, default_value = "false")]
        no_numbers: bool,

        #[arg(long, default_value = "false")]
        no_symbols: bool,
    },

    /// Generate a numeric PIN
    Pin {
        #[arg(short, long, default_value = "6")]
        length: u32,
    },
}

#[derive(clap::Args)]
pub struct RecordFields {
    /// Account name at the site
    #[arg(short, long)]
    pub username: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(short, long)]
    pub category: Option<String>,

    #[arg(short, long)]
    pub notes: Option<String>,

    /// The secret (prompted for when omitted)
    #[arg(long)]
    pub secret: Option<String>,
}

fn read_secret(given: Option<String>, prompt: &str) -> Result<Zeroizing<String>> {
    match given {
        Some(secret) => Ok(Zeroizing::new(secret)),
        None => rpassword::prompt_password(prompt)
            .map(Zeroizing::new)
            .context("Failed to read from terminal"),
    }
}

fn print_record(record: &SecretRecord) {
    println!("ID:        {}", record.id);
    println!("Label:     {}", record.label);
    println!("Username:  {}", record.username.as_deref().unwrap_or("-"));
    println!("URL:       {}", record.url.as_deref().unwrap_or("-"));
    println!("Category:  {}", record.category.as_deref().unwrap_or("-"));
    println!("Notes:     {}", record.notes.as_deref().unwrap_or("-"));
    println!("Created:   {}", record.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated:   {}", record.updated_at.format("%Y-%m-%d %H:%M"));
}

/// Register a new account
pub async fn cmd_register(
    app: &App,
    username: String,
    email: String,
    password: Option<String>,
) -> Result<bool> {
    let master = read_secret(password, "Master password: ")?;
    let state = app
        .perform(
            app.auth.slot(),
            || app.auth.register(&username, &email, &master),
            "Registered",
        )
        .await;

    Ok(matches!(state, OperationState::Success(_)))
}

/// Log in
pub async fn cmd_login(app: &App, username: String, password: Option<String>) -> Result<bool> {
    let master = read_secret(password, "Master password: ")?;
    let state = app
        .perform(
            app.auth.slot(),
            || app.auth.login(&username, &master),
            "Logged in",
        )
        .await;

    Ok(matches!(state, OperationState::Success(_)))
}

/// Log out
pub async fn cmd_logout(app: &App) -> Result<bool> {
    let user = app.auth.current_user().await;
    app.auth.logout().await;

    if let Some(err) = app.auth.state().error() {
        app.notifier.error(err.message.clone(), None);
        return Ok(false);
    }

    app.notifier.success(match user {
        Some(user) => format!("Logged out {}", user),
        None => "Logged out".to_string(),
    });
    Ok(true)
}

/// Show the logged-in user
pub async fn cmd_whoami(app: &App, json: bool) -> Result<bool> {
    let user = app.auth.current_user().await;

    if json {
        println!("{}", serde_json::json!({ "username": user }));
    } else {
        match &user {
            Some(user) => println!("{}", user),
            None => println!("Not logged in"),
        }
    }
    Ok(user.is_some())
}

/// List records
pub async fn cmd_list(app: &App, category: Option<String>, json: bool) -> Result<bool> {
    let state = app
        .perform(app.vault.list(), || app.vault.load(), "Passwords loaded")
        .await;

    let records: Vec<SecretRecord> = match state {
        OperationState::Success(records) => records
            .into_iter()
            .filter(|r| match &category {
                Some(category) => r.category.as_deref() == Some(category.as_str()),
                None => true,
            })
            .collect(),
        _ => return Ok(false),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(true);
    }

    if records.is_empty() {
        println!("No passwords stored");
        return Ok(true);
    }

    println!("{:<6} {:<28} {:<20} {}", "ID", "LABEL", "USERNAME", "CATEGORY");
    println!("{}", "-".repeat(70));
    for record in &records {
        println!(
            "{:<6} {:<28} {:<20} {}",
            record.id,
            record.label,
            record.username.as_deref().unwrap_or("-"),
            record.category.as_deref().unwrap_or("-")
        );
    }
    Ok(true)
}

/// Show one record
pub async fn cmd_show(app: &App, id: RecordId, json: bool) -> Result<bool> {
    let state = app
        .perform(app.vault.detail(), || app.vault.load_by_id(id), "Password loaded")
        .await;

    let OperationState::Success(record) = state else {
        return Ok(false);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(true)
}

/// Decrypt one record's secret
pub async fn cmd_reveal(app: &App, id: RecordId) -> Result<bool> {
    let state = app
        .perform(app.vault.reveal(), || app.vault.decrypt(id), "Password decrypted")
        .await;

    let revealed = match state {
        OperationState::Success(revealed) => revealed,
        _ => return Ok(false),
    };
    println!("{}", revealed.expose());

    drop(revealed);
    app.vault.hide();
    Ok(true)
}

/// Generate a password or PIN
pub async fn cmd_generate(app: &App, kind: GenerateKind) -> Result<bool> {
    let state = match kind {
        GenerateKind::Password {
            length,
            no_uppercase,
            no_lowercase,
            no_numbers,
            no_symbols,
        } => {
            let policy = PasswordPolicy {
                length,
                include_uppercase: !no_uppercase,
                include_lowercase: !no_lowercase,
                include_numbers: !no_numbers,
                include_symbols: !no_symbols,
            };
            app.perform(
                app.vault.generated(),
                || app.vault.generate_password(policy),
                "Password generated",
            )
            .await
        }
        GenerateKind::Pin { length } => {
            app.perform(
                app.vault.generated(),
                || app.vault.generate_pin(PinPolicy { length }),
                "PIN generated",
            )
            .await
        }
    };

    match state {
        OperationState::Success(generated) => {
            println!("{}", generated.value());
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn apply_fields(mut input: RecordInput, fields: RecordFields) -> RecordInput {
    if let Some(username) = fields.username {
        input = input.with_username(username);
    }
    if let Some(url) = fields.url {
        input = input.with_url(url);
    }
    if let Some(category) = fields.category {
        input = input.with_category(category);
    }
    if let Some(notes) = fields.notes {
        input = input.with_notes(notes);
    }
    input
}

/// Store a new record
pub async fn cmd_add(app: &App, label: String, mut fields: RecordFields) -> Result<bool> {
    let secret = read_secret(fields.secret.take(), "Secret: ")?;
    let input = apply_fields(RecordInput::new(label, secret.as_str()), fields);

    let state = app
        .perform(
            app.vault.save_state(),
            || app.vault.create(input.clone()),
            "Password saved",
        )
        .await;

    match state {
        OperationState::Success(record) => {
            println!("Created record {}", record.id);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Change a record, keeping whatever is not given
pub async fn cmd_edit(
    app: &App,
    id: RecordId,
    label: Option<String>,
    mut fields: RecordFields,
) -> Result<bool> {
    let current = match app.vault.detail().with(|s| s.success().cloned()) {
        Some(record) if record.id == id => record,
        _ => match app
            .perform(app.vault.detail(), || app.vault.load_by_id(id), "Password loaded")
            .await
        {
            OperationState::Success(record) => record,
            _ => return Ok(false),
        },
    };

    let secret = match fields.secret.take() {
        Some(secret) => Zeroizing::new(secret),
        None => {
            let typed = read_secret(None, "New secret (empty keeps the current one): ")?;
            if typed.is_empty() {
                match app
                    .perform(app.vault.reveal(), || app.vault.decrypt(id), "Password decrypted")
                    .await
                {
                    OperationState::Success(revealed) => {
                        let kept = Zeroizing::new(revealed.expose().to_string());
                        app.vault.hide();
                        kept
                    }
                    _ => return Ok(false),
                }
            } else {
                typed
            }
        }
    };

    let mut input = RecordInput::new(label.unwrap_or(current.label), secret.as_str());
    input.username = current.username;
    input.url = current.url;
    input.category = current.category;
    input.notes = current.notes;
    let input = apply_fields(input, fields);

    let state = app
        .perform(
            app.vault.save_state(),
            || app.vault.update(id, input.clone()),
            "Password updated",
        )
        .await;
    Ok(matches!(state, OperationState::Success(_)))
}

/// Delete a record
pub async fn cmd_delete(app: &App, id: RecordId) -> Result<bool> {
    let state = app
        .perform(app.vault.delete_state(), || app.vault.delete(id), "Password deleted")
        .await;
    Ok(matches!(state, OperationState::Success(_)))
}

/// List categories
pub async fn cmd_categories(app: &App, json: bool) -> Result<bool> {
    app.vault.load_categories();
    app.vault.wait_idle().await;
    let categories = app.vault.categories();

    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        for category in &categories {
            println!("{}", category);
        }
    }
    Ok(true)
}
