//! `xtrctl`: a command-line client for a running logger's control socket.
//!
//! ```text
//! xtrctl --path /run/user/1000/xtrctl.1234.0 status
//! xtrctl --path /run/user/1000/xtrctl.1234.0 status -p 'worker-*'
//! xtrctl --path /run/user/1000/xtrctl.1234.0 set-level 1 -p 'worker-*' -x
//! xtrctl --path /run/user/1000/xtrctl.1234.0 reopen
//! ```

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::process::ExitCode;
use std::time::Duration;

use xtr_ctl::wire::{self, Pattern, PatternKind, Request, Response};

struct Args {
    path: String,
    ignore_case: bool,
    pattern_kind: PatternKind,
    pattern_text: String,
    command: Command,
}

enum Command {
    Status,
    SetLevel(u8),
    Reopen,
}

fn parse_args() -> Result<Args, String> {
    let mut path = None;
    let mut ignore_case = false;
    let mut pattern_kind = PatternKind::None;
    let mut pattern_text = String::new();
    let mut command = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => path = Some(args.next().ok_or("--path requires a value")?),
            "-p" | "--pattern" => {
                pattern_text = args.next().ok_or("-p requires a value")?;
                if matches!(pattern_kind, PatternKind::None) {
                    pattern_kind = PatternKind::Wildcard;
                }
            }
            "-x" | "--extended-regex" => pattern_kind = PatternKind::ExtendedRegex,
            "-b" | "--basic-regex" => pattern_kind = PatternKind::BasicRegex,
            "-i" | "--ignore-case" => ignore_case = true,
            "status" => command = Some(Command::Status),
            "reopen" => command = Some(Command::Reopen),
            "set-level" => {
                let level: u8 = args
                    .next()
                    .ok_or("set-level requires a level")?
                    .parse()
                    .map_err(|_| "level must be a number")?;
                command = Some(Command::SetLevel(level));
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(Args {
        path: path.ok_or("--path is required")?,
        ignore_case,
        pattern_kind,
        pattern_text,
        command: command.ok_or("a command (status / set-level / reopen) is required")?,
    })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("xtrctl: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pattern = if args.pattern_text.is_empty() {
        Pattern::any()
    } else {
        match Pattern::new(args.pattern_kind, args.ignore_case, args.pattern_text) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("xtrctl: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let request = match args.command {
        Command::Status => Request::Status(pattern),
        Command::SetLevel(level) => Request::SetLevel { level, pattern },
        Command::Reopen => Request::Reopen,
    };

    match send(&args.path, &request) {
        Ok(Response::Status(sinks)) => {
            for sink in sinks {
                println!(
                    "{}\tlevel={}\tcapacity={}\tbuffered={}\tdropped={}",
                    sink.name, sink.level, sink.buf_capacity, sink.buf_nbytes, sink.dropped_count
                );
            }
            ExitCode::SUCCESS
        }
        Ok(Response::Success) => ExitCode::SUCCESS,
        Ok(Response::Error { reason }) => {
            eprintln!("xtrctl: {reason}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("xtrctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn send(path: &str, request: &Request) -> Result<Response, xtr_ctl::WireError> {
    let mut conn = UnixStream::connect(path)?;
    let mut buf = Vec::new();
    wire::encode_frame(request, &mut buf)?;
    conn.write_all(&buf)?;
    conn.shutdown(std::net::Shutdown::Write)?;

    conn.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut response_buf = Vec::new();
    conn.read_to_end(&mut response_buf)?;
    let (response, _) = wire::try_decode_frame(&response_buf)?.ok_or(xtr_ctl::WireError::Closed)?;
    Ok(response)
}
