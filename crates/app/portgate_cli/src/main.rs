// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use portgate_core::apps::queries::{
    all_permissions, get_application_by_port, list_accessible_applications, list_applications,
    register_application, set_application_active, set_application_permissions,
};
use portgate_core::auth::queries::{
    create_user, get_user_by_username, get_user_groups, list_users, set_user_groups,
};
use portgate_core::liveness::Prober;
use portgate_core::models::apps::NewApplication;
use portgate_core::models::auth::NewUser;
use sqlx::SqlitePool;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    if let Commands::Version = args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(args))
}

async fn execute(args: Cli) -> Result<()> {
    let url = match args.database_url {
        Some(url) => url,
        None => portgate_core::db::default_database_url()?,
    };
    let pool = portgate_core::db::connect(&url, 1).await?;
    let result = dispatch(&pool, args.command).await;
    pool.close().await;
    result
}

async fn dispatch(pool: &SqlitePool, command: Commands) -> Result<()> {
    match command {
        Commands::Version => {}

        Commands::CreateUser {
            username,
            password,
            full_name,
            email,
            role,
            groups,
        } => {
            let user = create_user(
                pool,
                &NewUser {
                    username,
                    password,
                    full_name,
                    email,
                    role,
                },
            )
            .await?;
            if !groups.is_empty() {
                set_user_groups(pool, &user.id, &groups).await?;
            }
            println!("created {} ({}) {}", user.username, user.role, user.id);
        }

        Commands::ListUsers => {
            for user in list_users(pool).await? {
                let groups = get_user_groups(pool, &user.id).await?;
                println!(
                    "{}\t{}\t{}\t{}",
                    user.username,
                    user.role,
                    if user.is_active { "active" } else { "inactive" },
                    groups.join(",")
                );
            }
        }

        Commands::SetGroups { username, groups } => {
            let user = get_user_by_username(pool, &username)
                .await?
                .ok_or_else(|| Error::Custom(format!("No user named {username}")))?;
            set_user_groups(pool, &user.id, &groups).await?;
            let groups = get_user_groups(pool, &user.id).await?;
            println!("{username}: {}", groups.join(","));
        }

        Commands::RegisterApp {
            port,
            name,
            description,
            category,
            groups,
        } => {
            let mut new_app = NewApplication::new(port, name);
            new_app.description = description;
            new_app.category = category;
            let app = register_application(pool, &new_app).await?;
            if let Some(groups) = groups {
                set_application_permissions(pool, &app.id, &groups).await?;
            }
            println!("registered {} on port {} {}", app.name, app.port, app.id);
        }

        Commands::SetPermissions { port, groups } => {
            let app = get_application_by_port(pool, port)
                .await?
                .ok_or_else(|| Error::Custom(format!("No application on port {port}")))?;
            set_application_permissions(pool, &app.id, &groups).await?;
            println!("{}: {}", app.name, groups.join(","));
        }

        Commands::SetAppActive { port, active } => {
            let app = get_application_by_port(pool, port)
                .await?
                .ok_or_else(|| Error::Custom(format!("No application on port {port}")))?;
            set_application_active(pool, &app.id, active).await?;
            println!(
                "{}: {}",
                app.name,
                if active { "active" } else { "inactive" }
            );
        }

        Commands::ListApps { user } => {
            let permissions = all_permissions(pool).await?;
            let apps = match user {
                Some(username) => {
                    let user = get_user_by_username(pool, &username)
                        .await?
                        .ok_or_else(|| Error::Custom(format!("No user named {username}")))?;
                    list_accessible_applications(pool, &user.id).await?
                }
                None => list_applications(pool).await?,
            };
            for app in apps {
                let groups: Vec<&str> = permissions
                    .get(&app.id)
                    .map(|g| g.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    app.port,
                    app.name,
                    app.category,
                    if app.is_active { "active" } else { "inactive" },
                    groups.join(",")
                );
            }
        }

        Commands::Scan { start, end } => {
            if start > end {
                return Err(Error::Custom("start must not exceed end".into()));
            }
            let registered: Vec<u16> = list_applications(pool)
                .await?
                .iter()
                .map(|a| a.port)
                .collect();
            let prober = Prober::local()
                .map_err(|e| Error::Custom(format!("HTTP client: {e}")))?;
            let found = prober.scan_range(start, end, &registered).await;
            log::info!("{} unregistered service(s) in {start}..={end}", found.len());
            for port in found {
                println!("{port}");
            }
        }
    }
    Ok(())
}
