use std::process::Command;

use dialoguer::Input;

use aws_ssh_tunnel::config::Settings;
use aws_ssh_tunnel::session::selector::TagFilter;
use aws_ssh_tunnel::{Result, TunnelError};

/// Update stored defaults, prompting (pre-filled with current values) for
/// anything not passed as an argument, then check that the external engines
/// the tool drives are installed
pub async fn execute(
    region: Option<String>,
    profile: Option<String>,
    tag: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let mut settings = Settings::load()?;

    settings.region = prompt_or_arg(
        region,
        "AWS region to use for tunneling sessions",
        settings.region.take(),
    )?;
    settings.profile = prompt_or_arg(
        profile,
        "AWS profile to assume for tunneling sessions",
        settings.profile.take(),
    )?;
    settings.tag = prompt_or_arg(
        tag,
        "Tag (KEY=VALUE) identifying the (jump) instance for SSH sessions",
        settings.tag.take(),
    )?;
    settings.user = prompt_or_arg(
        user,
        "OS user on the jump instance",
        settings.user.take(),
    )?;

    // Tags are matched case-sensitively by EC2, so store them verbatim but
    // reject ones that can never parse
    if let Some(ref tag) = settings.tag {
        TagFilter::parse(tag)?;
    }

    settings.save()?;
    println!("Configuration saved.");
    println!();

    check_prerequisites()
}

/// Use the CLI argument when given, otherwise prompt with the stored value
/// as the suggestion. An empty answer clears the setting.
fn prompt_or_arg(
    arg: Option<String>,
    prompt: &str,
    current: Option<String>,
) -> Result<Option<String>> {
    if let Some(value) = arg {
        return Ok(Some(value));
    }

    let answer: String = Input::new()
        .with_prompt(prompt)
        .default(current.unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .map_err(|e| TunnelError::Config(format!("Failed to read input: {}", e)))?;

    let answer = answer.trim().to_string();
    Ok(if answer.is_empty() { None } else { Some(answer) })
}

fn check_prerequisites() -> Result<()> {
    println!("Checking prerequisites...\n");

    let mut all_ok = true;

    print!("  AWS CLI: ");
    match check_command("aws", "--version") {
        Ok(version) => println!("OK ({})", version),
        Err(e) => {
            println!("MISSING");
            println!("    {}", e);
            all_ok = false;
        }
    }

    print!("  Session Manager Plugin: ");
    match check_command("session-manager-plugin", "--version") {
        Ok(version) => println!("OK ({})", version),
        Err(_) => {
            println!("MISSING");
            println!("    {}", TunnelError::SessionManagerPluginNotFound);
            all_ok = false;
        }
    }

    print!("  ssh: ");
    match check_command("ssh", "-V") {
        Ok(version) => println!("OK ({})", version),
        Err(e) => {
            println!("MISSING");
            println!("    {}", e);
            all_ok = false;
        }
    }

    println!();

    if all_ok {
        println!("All prerequisites met! Start a session with 'aws-ssh-tunnel start-forwarding-session' or 'aws-ssh-tunnel start-ssh-session'.");
        Ok(())
    } else {
        Err(TunnelError::Prerequisites(
            "Some prerequisites are not met".to_string(),
        ))
    }
}

fn check_command(program: &str, version_flag: &str) -> Result<String> {
    let output = Command::new(program)
        .arg(version_flag)
        .output()
        .map_err(|_| TunnelError::Prerequisites(format!("{} not found", program)))?;

    if output.status.success() || program == "ssh" {
        // ssh -V prints to stderr and some builds exit non-zero
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = stdout
            .lines()
            .chain(stderr.lines())
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(line)
    } else {
        Err(TunnelError::Prerequisites(format!(
            "{} not working",
            program
        )))
    }
}
