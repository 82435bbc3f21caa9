use std::{fmt, path::PathBuf};

use super::{
    parse_address_arg, parse_buffer_size_arg, parse_connection_count_arg, parse_port_number_arg, parse_timeout_arg, AddressErrorType,
    ArgumentsRequest, BufferSizeErrorType, ConnectionCountErrorType, PortErrorType, StartupArguments, TimeoutErrorType,
};

#[derive(Debug, PartialEq, Eq)]
pub enum ArgumentsError {
    UnknownArgument(String),
    Address(AddressErrorType),
    Port(PortErrorType),
    ConnectionCount(ConnectionCountErrorType),
    HostBuffer(BufferSizeErrorType),
    TargetBuffer(BufferSizeErrorType),
    WriteTimeout(TimeoutErrorType),
    MissingLogFile(String),
    VerboseAndSilent,
}

impl fmt::Display for ArgumentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArgument(arg) => write!(f, "Unknown argument: {arg}"),
            Self::Address(address_error) => address_error.fmt(f),
            Self::Port(port_error) => port_error.fmt(f),
            Self::ConnectionCount(count_error) => count_error.fmt(f),
            Self::HostBuffer(buffer_error) => buffer_error.fmt(f),
            Self::TargetBuffer(buffer_error) => buffer_error.fmt(f),
            Self::WriteTimeout(timeout_error) => timeout_error.fmt(f),
            Self::MissingLogFile(arg) => write!(f, "Expected file path after {arg}"),
            Self::VerboseAndSilent => write!(f, "Cannot be verbose and silent at the same time"),
        }
    }
}

fn try_parse_general_argument<F>(
    result: &mut StartupArguments,
    maybe_arg: &mut Option<String>,
    get_next_arg: F,
) -> Result<bool, ArgumentsError>
where
    F: FnOnce() -> Option<String>,
{
    let arg = match maybe_arg.take() {
        Some(s) => s,
        None => return Ok(false),
    };

    if arg.eq("-v") || arg.eq_ignore_ascii_case("--verbose") {
        result.verbose = true;
    } else if arg.eq("-s") || arg.eq_ignore_ascii_case("--silent") {
        result.silent = true;
    } else if arg.eq("-l") || arg.eq_ignore_ascii_case("--log-file") {
        match get_next_arg() {
            Some(path) if !path.is_empty() => result.log_file = Some(PathBuf::from(path)),
            _ => return Err(ArgumentsError::MissingLogFile(arg)),
        }
    } else {
        *maybe_arg = Some(arg);
    }

    Ok(maybe_arg.is_none())
}

fn try_parse_server_argument<F>(
    result: &mut StartupArguments,
    maybe_arg: &mut Option<String>,
    get_next_arg: F,
) -> Result<bool, ArgumentsError>
where
    F: FnOnce() -> Option<String>,
{
    let arg = match maybe_arg.take() {
        Some(s) => s,
        None => return Ok(false),
    };

    let config = &mut result.server_config;
    if arg.eq("-a") || arg.eq_ignore_ascii_case("--address") {
        config.address = parse_address_arg(arg, get_next_arg()).map_err(ArgumentsError::Address)?;
    } else if arg.eq("-p") || arg.eq_ignore_ascii_case("--port") {
        config.port = parse_port_number_arg(arg, get_next_arg()).map_err(ArgumentsError::Port)?;
    } else if arg.eq("-n") || arg.eq_ignore_ascii_case("--nconnections") {
        config.max_clients = parse_connection_count_arg(arg, get_next_arg()).map_err(ArgumentsError::ConnectionCount)?;
    } else if arg.eq_ignore_ascii_case("--host-buffer") {
        config.host_buffer_size = parse_buffer_size_arg(arg, get_next_arg()).map_err(ArgumentsError::HostBuffer)?;
    } else if arg.eq_ignore_ascii_case("--target-buffer") {
        config.target_buffer_size = parse_buffer_size_arg(arg, get_next_arg()).map_err(ArgumentsError::TargetBuffer)?;
    } else if arg.eq_ignore_ascii_case("--write-timeout") {
        config.write_timeout = parse_timeout_arg(arg, get_next_arg()).map_err(ArgumentsError::WriteTimeout)?;
    } else {
        *maybe_arg = Some(arg);
    }

    Ok(maybe_arg.is_none())
}

pub fn parse_arguments<T>(mut args: T) -> Result<ArgumentsRequest, ArgumentsError>
where
    T: Iterator<Item = String>,
{
    let mut result = StartupArguments::new();

    // Ignore the first argument, as it's by convention the name of the program
    args.next();

    while let Some(arg) = args.next() {
        if arg.is_empty() {
            continue;
        } else if arg.eq("-h") || arg.eq_ignore_ascii_case("--help") {
            return Ok(ArgumentsRequest::Help);
        } else if arg.eq("-V") || arg.eq_ignore_ascii_case("--version") {
            return Ok(ArgumentsRequest::Version);
        }

        let mut maybe_arg = Some(arg);
        let _ = !try_parse_general_argument(&mut result, &mut maybe_arg, || args.next())?
            && !try_parse_server_argument(&mut result, &mut maybe_arg, || args.next())?;

        if let Some(arg) = maybe_arg {
            return Err(ArgumentsError::UnknownArgument(arg));
        }
    }

    if result.verbose && result.silent {
        return Err(ArgumentsError::VerboseAndSilent);
    }

    Ok(ArgumentsRequest::Run(result))
}
