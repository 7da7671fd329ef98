//! Remote shell command lines and parsers for their output.
//!
//! Everything here is pure so the exact commands the SSH session runs
//! can be checked without a remote host.

use std::borrow::Cow;

use rangepull_transfer::ByteRange;

use crate::error::RemoteError;
use crate::session::{FetchStatus, Mountpoint, SourceSpec};

/// `curl -w` format: status code and downloaded byte count.
const CURL_WRITE_OUT: &str = "%{http_code},%{size_download}";

/// Quotes one argument for a POSIX shell.
pub fn quote(arg: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(arg))
}

fn join(args: &[&str]) -> String {
    args.iter()
        .map(|a| quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn header_args(source: &SourceSpec) -> Vec<String> {
    source
        .headers
        .iter()
        .flat_map(|(name, value)| ["-H".to_string(), format!("{name}: {value}")])
        .collect()
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn exists(path: &str) -> String {
    format!("if [ -e {} ]; then echo 1; else echo 0; fi", quote(path))
}

pub fn stat_size(path: &str) -> String {
    format!("stat -c %s {}", quote(path))
}

pub fn mountpoint(path: &str) -> String {
    format!("df --output=source,pcent,target {}", quote(path))
}

pub fn used_percent(mount_target: &str) -> String {
    format!("df --output=pcent {}", quote(mount_target))
}

/// Header-only request following redirects.
pub fn source_size(source: &SourceSpec) -> String {
    let headers = header_args(source);
    let mut args = vec!["curl", "-sSIL"];
    args.extend(headers.iter().map(String::as_str));
    args.push(&source.url);
    join(&args)
}

/// Range fetch into `dest`, printing [`CURL_WRITE_OUT`].
pub fn fetch_range(source: &SourceSpec, range: ByteRange, dest: &str) -> String {
    let Some(spec) = range.http_spec() else {
        return format!(
            ": > {} && echo {},0",
            quote(dest),
            FetchStatus::EMPTY.http_status
        );
    };
    let headers = header_args(source);
    let mut args = vec![
        "curl",
        "-w",
        CURL_WRITE_OUT,
        "-L",
        "-S",
        "-s",
        "-r",
        spec.as_str(),
        "-o",
        dest,
    ];
    args.extend(headers.iter().map(String::as_str));
    args.push(&source.url);
    join(&args)
}

pub fn mkdir(path: &str) -> String {
    format!("mkdir -p {}", quote(path))
}

/// Concatenates `parts` in order into `dest` and prints the result size.
pub fn concat(parts: &[String], dest: &str) -> String {
    let inputs = parts
        .iter()
        .map(|p| quote(p))
        .collect::<Vec<_>>()
        .join(" ");
    let dest = quote(dest);
    format!("cat {inputs} > {dest} && stat -c %s {dest}")
}

pub fn rename(src: &str, dest: &str) -> String {
    format!("mv -f {} {}", quote(src), quote(dest))
}

pub fn touch(path: &str) -> String {
    format!("touch {}", quote(path))
}

pub fn remove_recursive(path: &str) -> String {
    format!("rm -rf {}", quote(path))
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

pub fn parse_exists(out: &str) -> Result<bool, RemoteError> {
    match out.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(RemoteError::Parse(format!("exists: {other:?}"))),
    }
}

pub fn parse_size(out: &str) -> Result<u64, RemoteError> {
    out.trim()
        .parse()
        .map_err(|_| RemoteError::Parse(format!("size: {:?}", out.trim())))
}

/// Parses a `df` percentage cell such as ` 12%`.
pub fn parse_percent(cell: &str) -> Result<u8, RemoteError> {
    let trimmed = cell.trim();
    trimmed
        .strip_suffix('%')
        .unwrap_or(trimmed)
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| RemoteError::Parse(format!("percentage: {trimmed:?}")))
}

/// Last non-empty line of `df` output, skipping the header.
fn df_row(out: &str) -> &str {
    out.lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .unwrap_or_default()
}

/// Converts `df` used-percentage output into free percentage.
pub fn parse_free_percent(out: &str) -> Result<u8, RemoteError> {
    parse_percent(df_row(out)).map(|used| 100 - used)
}

/// Parses the data row of `df --output=source,pcent,target`.
///
/// The target is last so mount paths containing spaces survive.
pub fn parse_mountpoint(out: &str) -> Result<Mountpoint, RemoteError> {
    let line = df_row(out);
    let mut fields = line.split_whitespace();
    let (Some(filesystem), Some(pcent)) = (fields.next(), fields.next()) else {
        return Err(RemoteError::Parse(format!("df row: {line:?}")));
    };
    let target = fields.collect::<Vec<_>>().join(" ");
    if target.is_empty() {
        return Err(RemoteError::Parse(format!("df row: {line:?}")));
    }
    let used = parse_percent(pcent)?;
    Ok(Mountpoint {
        target,
        filesystem: filesystem.to_string(),
        free_percent: 100 - used,
    })
}

/// Takes the `Content-Length` of the last response in a redirect chain.
///
/// The last response must be a 2xx; anything else means the source
/// cannot be read, whatever length it advertises.
pub fn parse_content_length(out: &str) -> Result<u64, RemoteError> {
    let mut status = None;
    let mut length = None;
    for line in out.lines().map(str::trim) {
        if line.starts_with("HTTP/") {
            status = line.split_whitespace().nth(1).map(str::to_string);
            length = None;
        } else if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            length = Some(value.trim());
        }
    }

    let status = status.ok_or_else(|| RemoteError::Parse("no status line in response".into()))?;
    let code: u16 = status
        .parse()
        .map_err(|_| RemoteError::Parse(format!("status code: {status:?}")))?;
    if !(200..300).contains(&code) {
        return Err(RemoteError::CommandFailed {
            code: None,
            stderr: format!("source answered HTTP {code}"),
        });
    }

    length
        .ok_or_else(|| RemoteError::Parse("no content-length in response".into()))?
        .parse()
        .map_err(|_| RemoteError::Parse("invalid content-length".into()))
}

/// Parses the [`CURL_WRITE_OUT`] line (`206,1048576`).
///
/// Older curl releases print the byte count as a float (`1048576.000`).
pub fn parse_fetch_status(out: &str) -> Result<FetchStatus, RemoteError> {
    let line = out.trim();
    let parse_err = || RemoteError::Parse(format!("fetch status: {line:?}"));
    let (code, size) = line.split_once(',').ok_or_else(parse_err)?;
    let http_status = code.trim().parse().map_err(|_| parse_err())?;
    let whole = size.trim().split('.').next().unwrap_or_default();
    let bytes = whole.parse().map_err(|_| parse_err())?;
    Ok(FetchStatus { http_status, bytes })
}
