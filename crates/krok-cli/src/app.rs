//! Command execution against the installed auth provider.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use krok_core::{
    use_auth, AuthProvider, Config, JsonFileStore, ProviderGuard, Registration, User,
    UserPatch,
};

use crate::Command;

pub struct App {
    config: Config,
    _provider: ProviderGuard,
}

impl App {
    /// Load config, open the storage file and install the auth provider.
    pub fn open(storage_override: Option<PathBuf>) -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let storage_path = match storage_override {
            Some(path) => path,
            None => config.storage_path()?,
        };
        debug!(?storage_path, "Storage path configured");

        let store = JsonFileStore::open(&storage_path)
            .with_context(|| format!("Failed to open storage at {}", storage_path.display()))?;
        let provider = AuthProvider::new(store).context("Failed to initialize auth store")?;

        Ok(Self {
            config,
            _provider: provider,
        })
    }

    pub fn run(&mut self, command: Command) -> Result<()> {
        match command {
            // Seeding already happened when the provider was installed
            Command::Seed => {
                let count = use_auth(|auth| auth.users().list())?.len();
                println!("{} user(s) stored", count);
            }
            Command::Login { email, password } => self.login(email, password)?,
            Command::Logout => {
                use_auth(|auth| auth.logout())?;
                println!("Logged out");
            }
            Command::Whoami => use_auth(|auth| match auth.user() {
                Some(user) => println!("Signed in as {}", describe(user)),
                None => println!("Not signed in"),
            }),
            Command::Register {
                name,
                email,
                password,
            } => self.register(name, email, password)?,
            Command::UpdateProfile {
                name,
                email,
                password,
            } => {
                let patch = UserPatch {
                    name,
                    email,
                    password,
                    role: None,
                };
                if patch.is_empty() {
                    anyhow::bail!("Nothing to update: pass --name, --email or --password");
                }
                match use_auth(|auth| auth.update_user(&patch))? {
                    Some(user) => println!("Updated {}", describe(&user)),
                    None => println!("Not signed in, nothing updated"),
                }
            }
            Command::Users => {
                let users = use_auth(|auth| auth.users().list())?;
                for user in &users {
                    println!("{:<15} {:<7} {:<30} {}", user.id, user.role, user.email, user.name);
                }
            }
        }
        Ok(())
    }

    fn login(&mut self, email: Option<String>, password: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        };
        let password = match password {
            Some(password) => password,
            None => prompt_password()?,
        };

        if use_auth(|auth| auth.login(&email, &password))? {
            self.config.last_email = Some(email);
            if let Err(e) = self.config.save() {
                warn!(error = %e, "Failed to save config");
            }
            use_auth(|auth| {
                if let Some(user) = auth.user() {
                    println!("Login successful: {}", describe(user));
                }
            });
            Ok(())
        } else {
            anyhow::bail!("Invalid email or password")
        }
    }

    fn register(&mut self, name: String, email: String, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(password) => password,
            None => prompt_password()?,
        };

        match use_auth(|auth| auth.register(Registration::new(name, email, password))) {
            Ok(outcome) => {
                println!("Registration successful: {}", describe(&outcome.user));
                debug!(redirect_to = outcome.redirect_to, "Registration complete");
                Ok(())
            }
            Err(e) if e.is_user_facing() => anyhow::bail!("{}", e),
            Err(e) => Err(anyhow::Error::new(e).context("Registration failed")),
        }
    }
}

fn describe(user: &User) -> String {
    format!("{} <{}> ({})", user.name, user.email, user.role)
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}
