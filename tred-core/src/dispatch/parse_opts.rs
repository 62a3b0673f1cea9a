use tred_store::SetCondition;
use tred_store::store::now_unix_millis;

/// Expiration request attached to a SET command, before clock resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SetExpire {
    /// `EX <seconds>`: relative to now.
    Seconds(i64),
    /// `PX <milliseconds>`: relative to now.
    Milliseconds(i64),
    /// `EXAT <unix-seconds>`: absolute.
    AtSeconds(i64),
    /// `PXAT <unix-milliseconds>`: absolute, truncated to whole seconds.
    AtMilliseconds(i64),
}

/// Normalized SET option record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) struct SetOptions {
    pub(super) condition: SetCondition,
    pub(super) expire: Option<SetExpire>,
}

/// Parses the option tail of `SET key value [option]...`.
///
/// Option tokens are matched case-sensitively in their uppercase form. Unrecognized tokens are
/// skipped; an expiration keyword without a following integer fails the whole command. When an
/// expiration keyword repeats, the last occurrence wins.
pub(super) fn parse_set_options(args: &[Vec<u8>]) -> Result<SetOptions, String> {
    let mut options = SetOptions::default();
    let mut index = 0_usize;

    while let Some(arg) = args.get(index) {
        match arg.as_slice() {
            b"NX" => {
                if options.condition == SetCondition::IfExists {
                    return Err("NX and XX options at the same time are not compatible".to_owned());
                }
                options.condition = SetCondition::IfMissing;
                index += 1;
            }
            b"XX" => {
                if options.condition == SetCondition::IfMissing {
                    return Err("NX and XX options at the same time are not compatible".to_owned());
                }
                options.condition = SetCondition::IfExists;
                index += 1;
            }
            keyword @ (b"EX" | b"PX" | b"EXAT" | b"PXAT") => {
                let Some(raw_number) = args.get(index + 1) else {
                    return Err(format!(
                        "missing argument for {}",
                        String::from_utf8_lossy(keyword)
                    ));
                };
                let Some(number) = parse_command_i64(raw_number) else {
                    return Err("value is not an integer or out of range".to_owned());
                };
                options.expire = Some(match keyword {
                    b"EX" => SetExpire::Seconds(number),
                    b"PX" => SetExpire::Milliseconds(number),
                    b"EXAT" => SetExpire::AtSeconds(number),
                    _ => SetExpire::AtMilliseconds(number),
                });
                index += 2;
            }
            // Unrecognized tokens are skipped rather than rejected.
            _ => index += 1,
        }
    }

    Ok(options)
}

/// Resolves an expiration request into an absolute unix-millisecond deadline.
///
/// `PXAT` drops sub-second precision on purpose: the deadline lands on the whole second below
/// the requested millisecond timestamp.
pub(super) fn resolve_expire_at_unix_millis(expire: SetExpire) -> u64 {
    match expire {
        SetExpire::Seconds(seconds) => {
            now_unix_millis().saturating_add_signed(seconds.saturating_mul(1000))
        }
        SetExpire::Milliseconds(milliseconds) => {
            now_unix_millis().saturating_add_signed(milliseconds)
        }
        SetExpire::AtSeconds(unix_seconds) => {
            u64::try_from(unix_seconds.saturating_mul(1000)).unwrap_or(0)
        }
        SetExpire::AtMilliseconds(unix_milliseconds) => {
            u64::try_from((unix_milliseconds / 1000).saturating_mul(1000)).unwrap_or(0)
        }
    }
}

fn parse_command_i64(payload: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(payload).ok()?;
    text.parse::<i64>().ok()
}
