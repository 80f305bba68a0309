use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::calendar::build_month_view;
use crate::cli::Invocation;
use crate::client::{ApiClient, ApiError, Registration};
use crate::config::Config;
use crate::datetime::{Zone, parse_month_arg};
use crate::event::{EventCollection, EventId, NewEventDraft};
use crate::filter::EventFilter;
use crate::notify::Notifier;
use crate::render::Renderer;
use crate::rsvp::{RsvpCounts, RsvpStatus};
use crate::session::{Session, SessionStore};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "calendar",
        "events",
        "info",
        "rsvp",
        "create",
        "delete",
        "login",
        "register",
        "logout",
        "whoami",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if token.is_empty() {
        return None;
    }
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command may touch, resolved once per invocation.
pub struct CommandContext<'a> {
    pub cfg: &'a Config,
    pub store: &'a SessionStore,
    pub session: Session,
    pub api: ApiClient,
    pub zone: Zone,
    pub renderer: &'a Renderer,
    pub notifier: &'a Notifier,
}

/// Results go to `out`; notifications and prompts go to `err`.
#[instrument(skip_all, fields(command = %inv.command))]
pub fn dispatch(
    store: &SessionStore,
    cfg: &Config,
    renderer: &Renderer,
    notifier: &Notifier,
    inv: Invocation,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> anyhow::Result<()> {
    let session = store.load().context("failed to load session")?;
    let api = ApiClient::new(&cfg.api_url(), &session)?;
    let zone = Zone::resolve(cfg.get_nonempty("timezone"));
    let ctx = CommandContext {
        cfg,
        store,
        session,
        api,
        zone,
        renderer,
        notifier,
    };

    let command = inv.command.as_str();
    debug!(
        command,
        args = ?inv.args,
        zone = %ctx.zone,
        logged_in = ctx.session.user().is_some(),
        "dispatching command"
    );

    match command {
        "calendar" => cmd_calendar(&ctx, &inv.args, out, err),
        "events" => cmd_events(&ctx, &inv.args, out),
        "info" => cmd_info(&ctx, &inv.args, out),
        "rsvp" => cmd_rsvp(&ctx, &inv.args, err),
        "create" => cmd_create(&ctx, &inv.args, err),
        "delete" => cmd_delete(&ctx, &inv.args, out, err),
        "login" => cmd_login(&ctx, &inv.args, err),
        "register" => cmd_register(&ctx, &inv.args, err),
        "logout" => cmd_logout(&ctx, out, err),
        "whoami" => cmd_whoami(&ctx, out),
        "_commands" => cmd_commands(out),
        "_show" => cmd_show(cfg, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// A failed fetch still renders the month, empty.
#[instrument(skip(ctx, args, out, err))]
fn cmd_calendar(
    ctx: &CommandContext<'_>,
    args: &[String],
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> anyhow::Result<()> {
    info!("command calendar");

    if args.len() > 1 {
        bail!("calendar takes at most one month argument (YYYY-MM, +N or -N)");
    }

    let today = ctx.zone.today();
    let reference = parse_month_arg(args.first().map_or("", String::as_str), today)?;

    let events = match ctx.api.list_events() {
        Ok(payload) => EventCollection::from_payload(payload, ctx.zone),
        Err(fetch_err) => {
            debug!(error = %fetch_err, "event fetch failed; rendering empty month");
            ctx.notifier
                .error(err, &format!("Failed to load events: {fetch_err}"));
            EventCollection::default()
        }
    };

    let cells = build_month_view(reference, &events);
    ctx.renderer.write_month(out, reference, today, &cells)
}

#[instrument(skip(ctx, args, out))]
fn cmd_events(ctx: &CommandContext<'_>, args: &[String], out: &mut dyn Write) -> anyhow::Result<()> {
    info!("command events");

    let filter = EventFilter::parse(args)?;
    let payload = ctx.api.list_events().context("failed to load events")?;
    let events = EventCollection::from_payload(payload, ctx.zone);
    let matched = filter.apply(events.events());

    if matched.is_empty() {
        writeln!(out, "No matching events.")?;
        return Ok(());
    }

    ctx.renderer.write_event_table(&mut *out, &matched)?;
    writeln!(out)?;
    writeln!(out, "{} event(s)", matched.len())?;
    Ok(())
}

/// Renders the raw record, so undated events still show their details.
#[instrument(skip(ctx, args, out))]
fn cmd_info(ctx: &CommandContext<'_>, args: &[String], out: &mut dyn Write) -> anyhow::Result<()> {
    info!("command info");

    let id = single_event_id("info", args)?;
    let record = ctx
        .api
        .get_event(&id)
        .with_context(|| format!("failed to load event {id}"))?;

    let counts = match ctx.api.list_rsvps(&id) {
        Ok(rsvps) => Some(RsvpCounts::tally(&rsvps)),
        Err(err) => {
            warn!(event_id = %id, error = %err, "could not load RSVPs");
            None
        }
    };

    ctx.renderer
        .write_event_info(out, &record, ctx.zone, counts)
}

#[instrument(skip(ctx, args, err))]
fn cmd_rsvp(ctx: &CommandContext<'_>, args: &[String], err: &mut dyn Write) -> anyhow::Result<()> {
    info!("command rsvp");

    ctx.session.require_user()?;
    let [id, status] = args else {
        bail!("usage: rsvp <id> attending|unavailable");
    };
    let id = EventId::new(id.as_str());
    let status = status.parse::<RsvpStatus>()?;

    ctx.api
        .submit_rsvp(&id, status.clone())
        .with_context(|| format!("failed to submit RSVP for event {id}"))?;
    ctx.notifier
        .success(err, &format!("RSVP for event {id}: {status}"));
    Ok(())
}

#[instrument(skip(ctx, args, err))]
fn cmd_create(ctx: &CommandContext<'_>, args: &[String], err: &mut dyn Write) -> anyhow::Result<()> {
    info!("command create");

    ctx.session.require_admin("create events")?;
    let mut draft = NewEventDraft::default();
    for (key, value) in parse_fields(args)? {
        draft.set(&key, &value)?;
    }
    let new_event = draft.finish()?;

    let created = ctx
        .api
        .create_event(&new_event)
        .context("failed to create event")?;
    ctx.notifier.success(err, &format!(
        "Created event {}: {}",
        created.id, new_event.title
    ));
    Ok(())
}

#[instrument(skip(ctx, args, out, err))]
fn cmd_delete(
    ctx: &CommandContext<'_>,
    args: &[String],
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> anyhow::Result<()> {
    info!("command delete");

    ctx.session.require_admin("delete events")?;
    let id = single_event_id("delete", args)?;

    if ctx.cfg.get_bool("confirmation").unwrap_or(true)
        && !confirm(err, &format!("Delete event {id}? (yes/no) "))?
    {
        writeln!(out, "Event {id} not deleted.")?;
        return Ok(());
    }

    ctx.api
        .delete_event(&id)
        .with_context(|| format!("failed to delete event {id}"))?;
    ctx.notifier.success(err, &format!("Deleted event {id}"));
    Ok(())
}

#[instrument(skip(ctx, args, err))]
fn cmd_login(ctx: &CommandContext<'_>, args: &[String], err: &mut dyn Write) -> anyhow::Result<()> {
    info!("command login");

    let (email, password) = match args {
        [email] => (email.clone(), read_secret(err, "Password: ")?),
        [email, password] => (email.clone(), password.clone()),
        _ => bail!("usage: login <email> [password]"),
    };

    let (user, cookie) = match ctx.api.login(&email, &password) {
        Ok(found) => found,
        Err(ApiError::Unauthorized) => bail!("invalid email or password"),
        Err(login_err) => return Err(login_err).context("login failed"),
    };

    let greeting = format!("Logged in as {}", user.display_name());
    ctx.store
        .save(&Session::logged_in(user, cookie))
        .context("failed to save session")?;
    ctx.notifier.success(err, &greeting);
    Ok(())
}

/// Passwords are compared locally before anything is sent.
#[instrument(skip(ctx, args, err))]
fn cmd_register(ctx: &CommandContext<'_>, args: &[String], err: &mut dyn Write) -> anyhow::Result<()> {
    info!("command register");

    let mut name = None;
    let mut email = None;
    let mut password = None;
    let mut confirmation = None;
    for (key, value) in parse_fields(args)? {
        let slot = match key.to_ascii_lowercase().as_str() {
            "name" => &mut name,
            "email" => &mut email,
            "password" => &mut password,
            "confirm" | "confirmpassword" => &mut confirmation,
            other => bail!("unknown registration field: {other}"),
        };
        *slot = Some(value);
    }

    let (Some(name), Some(email), Some(password), Some(confirmation)) =
        (name, email, password, confirmation)
    else {
        bail!("usage: register name:<name> email:<email> password:<pw> confirm:<pw>");
    };
    if password != confirmation {
        bail!("passwords do not match");
    }

    match ctx.api.register(&Registration::new(name, email, password)) {
        Ok(()) => {
            ctx.notifier
                .success(err, "Registration successful; you can now login");
            Ok(())
        }
        Err(api_err) if api_err.is_duplicate_entry() => bail!("this email is already registered"),
        Err(api_err) => Err(api_err).context("registration failed"),
    }
}

/// A failed backend logout keeps the local session.
#[instrument(skip(ctx, out, err))]
fn cmd_logout(ctx: &CommandContext<'_>, out: &mut dyn Write, err: &mut dyn Write) -> anyhow::Result<()> {
    info!("command logout");

    if ctx.session.user().is_none() {
        writeln!(out, "Not logged in.")?;
        return Ok(());
    }

    match ctx.api.logout() {
        Ok(()) => {
            ctx.store.clear()?;
            ctx.notifier.success(err, "Logged out");
        }
        Err(api_err) => {
            debug!(error = %api_err, "logout failed; keeping session");
            ctx.notifier.error(err, "Logout failed");
        }
    }
    Ok(())
}

fn cmd_whoami(ctx: &CommandContext<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
    match ctx.session.user() {
        Some(user) => ctx.renderer.write_user(out, user),
        None => {
            writeln!(out, "Not logged in.")?;
            Ok(())
        }
    }
}

fn cmd_commands(out: &mut dyn Write) -> anyhow::Result<()> {
    for command in known_command_names() {
        writeln!(out, "{command}")?;
    }
    Ok(())
}

fn cmd_show(cfg: &Config, out: &mut dyn Write) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        writeln!(out, "{k}={v}")?;
    }
    Ok(())
}

fn cmd_help(out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(
        out,
        "Commands: calendar [YYYY-MM|+N|-N], events [term...] [category:NAME], info <id>, \
         rsvp <id> attending|unavailable, create field:value..., delete <id>, \
         login <email> [password], register name: email: password: confirm:, logout, whoami"
    )?;
    Ok(())
}

fn single_event_id(command: &str, args: &[String]) -> anyhow::Result<EventId> {
    match args {
        [id] if !id.trim().is_empty() => Ok(EventId::new(id.trim())),
        _ => bail!("usage: {command} <id>"),
    }
}

/// `key:value` (or `key=value`) tokens. A token without a separator
/// continues the previous value, so `title:Rust workshop` keeps both words.
fn parse_fields(args: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for arg in args {
        if let Some((key, value)) = arg.split_once(':').or_else(|| arg.split_once('='))
            && !key.is_empty()
            && !key.contains(' ')
        {
            fields.push((key.to_string(), value.to_string()));
            continue;
        }

        match fields.last_mut() {
            Some((_, previous)) => {
                previous.push(' ');
                previous.push_str(arg);
            }
            None => bail!("expected field:value, got {arg:?}"),
        }
    }

    Ok(fields)
}

fn confirm(err: &mut dyn Write, prompt: &str) -> anyhow::Result<bool> {
    let answer = read_line(err, prompt)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn read_secret(err: &mut dyn Write, prompt: &str) -> anyhow::Result<String> {
    let secret = read_line(err, prompt)?;
    if secret.is_empty() {
        bail!("no password given");
    }
    Ok(secret)
}

fn read_line(err: &mut dyn Write, prompt: &str) -> anyhow::Result<String> {
    if io::stdin().is_terminal() {
        write!(err, "{prompt}")?;
        err.flush()?;
    }

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
