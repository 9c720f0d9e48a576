use clap::Args;

use crate::app::api::{self, NewApp};
use crate::domain::{
    AppError, AppRemoval, AppUpdate, Config, EnvVar, HttpAuth, PortMapping, Volume,
};

/// Configuration flags shared by `create` and `update`.
#[derive(Args)]
pub struct ConfigFlags {
    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
    /// Volume as name:/path or /host/path:/path (repeatable)
    #[arg(long = "volume", value_name = "SPEC")]
    volumes: Vec<String>,
    /// Port mapping as host:container (repeatable)
    #[arg(short, long = "port", value_name = "HOST:CONTAINER")]
    ports: Vec<String>,
    /// Number of instances
    #[arg(long)]
    instances: Option<u32>,
    /// Serve the app over HTTP
    #[arg(long, conflicts_with = "no_expose")]
    expose: bool,
    /// Keep the app internal
    #[arg(long)]
    no_expose: bool,
    /// Port the app listens on for HTTP traffic
    #[arg(long)]
    container_port: Option<u16>,
    /// Basic auth as user:password
    #[arg(long, value_name = "USER:PASSWORD")]
    http_auth: Option<String>,
}

impl ConfigFlags {
    fn to_update(&self) -> Result<AppUpdate, AppError> {
        let expose_as_web_app = match (self.expose, self.no_expose) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Ok(AppUpdate {
            instance_count: self.instances,
            expose_as_web_app,
            container_http_port: self.container_port,
            env_vars: self.env.iter().map(|spec| EnvVar::parse(spec)).collect::<Result<_, _>>()?,
            volumes: self.volumes.iter().map(|spec| Volume::parse(spec)).collect::<Result<_, _>>()?,
            ports: self.ports.iter().map(|spec| PortMapping::parse(spec)).collect::<Result<_, _>>()?,
            http_auth: self.http_auth.as_deref().map(HttpAuth::parse).transpose()?,
            ..AppUpdate::default()
        })
    }
}

#[derive(Args)]
pub struct CreateArgs {
    /// App name
    name: String,
    /// The app keeps data in volumes
    #[arg(long)]
    persistent: bool,
    /// Custom domain to attach
    #[arg(long)]
    domain: Option<String>,
    /// Enable HTTPS for the custom domain
    #[arg(long, requires = "domain")]
    ssl: bool,
    #[command(flatten)]
    flags: ConfigFlags,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// App name
    name: String,
    /// Environment variable to remove (repeatable)
    #[arg(long = "unset-env", value_name = "KEY")]
    unset_env: Vec<String>,
    /// Remove HTTP basic auth
    #[arg(long, conflicts_with = "http_auth")]
    clear_http_auth: bool,
    #[command(flatten)]
    flags: ConfigFlags,
}

pub fn run_create(config: &Config, args: CreateArgs) -> Result<(), AppError> {
    let app = NewApp {
        name: args.name,
        has_persistent_data: args.persistent,
        domain: args.domain,
        enable_ssl: args.ssl,
        update: args.flags.to_update()?,
    };
    let state = api::create_app(config, &app)?;
    println!("✅ Created {}", state.name);
    for domain in &state.custom_domains {
        println!("  • {}", domain);
    }
    Ok(())
}

pub fn run_update(config: &Config, args: UpdateArgs) -> Result<(), AppError> {
    let removal = AppRemoval {
        env_keys: args.unset_env,
        http_auth: args.clear_http_auth,
        ..AppRemoval::default()
    };
    let update = args.flags.to_update()?;
    if removal.is_empty() && update.is_empty() {
        return Err(AppError::validation("Nothing to update"));
    }
    let state = api::update_app(config, &args.name, &removal, &update)?;
    println!("✅ Updated {}", state.name);
    Ok(())
}

pub fn run_ssl(config: &Config, name: &str, domain: &str) -> Result<(), AppError> {
    api::enable_ssl(config, name, domain)?;
    println!("✅ Enabled HTTPS for {} on {}", domain, name);
    Ok(())
}

pub fn run_list(config: &Config) -> Result<(), AppError> {
    let apps = api::list_apps(config)?;
    if apps.is_empty() {
        println!("No apps.");
        return Ok(());
    }
    for app in apps {
        let status = if app.is_running() { "running" } else { "stopped" };
        println!("{:<40} {:>3} instance(s)  {}", app.name, app.instance_count, status);
    }
    Ok(())
}
