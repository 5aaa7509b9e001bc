use kchan_admin::{SecretReference, TopicConfig};
use tracing::{debug, info, instrument};

use super::error::StageError;
use super::session::AdminSession;
use crate::config::TopicDefaultsConfig;
use crate::crd::KafkaChannel;
use crate::resources::channel_topic;

/// Resolve the topic settings for `channel`, falling back to controller
/// defaults for anything the channel leaves unset.
pub fn topic_config(
    channel: &KafkaChannel,
    defaults: &TopicDefaultsConfig,
) -> Result<TopicConfig, StageError> {
    let spec = &channel.spec;
    let num_partitions = spec.num_partitions.unwrap_or(defaults.num_partitions);
    if num_partitions < 1 {
        return Err(StageError::TopicConfig(format!(
            "numPartitions must be positive, got {}",
            num_partitions
        )));
    }
    let replication_factor =
        spec.replication_factor.unwrap_or(defaults.replication_factor);
    if replication_factor < 1 {
        return Err(StageError::TopicConfig(format!(
            "replicationFactor must be positive, got {}",
            replication_factor
        )));
    }
    let retention_ms = match spec.retention_duration.as_deref() {
        Some(d) => parse_iso8601_millis(d).ok_or_else(|| {
            StageError::TopicConfig(format!(
                "invalid retentionDuration {:?}",
                d
            ))
        })?,
        None => defaults.retention_ms,
    };
    Ok(TopicConfig {
        num_partitions,
        replication_factor,
        retention_ms,
    })
}

/// Ensure the backing topic exists and report the credentials secret bound
/// to it. An unbound topic yields `Ok(None)`; deciding whether that blocks
/// the attempt is up to the caller.
#[instrument(skip_all, fields(topic = %channel_topic(channel)))]
pub async fn ensure_topic(
    session: &AdminSession,
    channel: &KafkaChannel,
    defaults: &TopicDefaultsConfig,
) -> Result<Option<SecretReference>, StageError> {
    let topic = channel_topic(channel);
    let config = topic_config(channel, defaults)?;
    let admin = session.client()?;
    admin
        .ensure_topic(&topic, &config)
        .await
        .map_err(|source| StageError::Topic {
            topic: topic.clone(),
            source,
        })?;
    debug!(partitions = config.num_partitions, replication = config.replication_factor, "topic ensured");
    let secret = admin
        .resolve_secret_reference(&topic)
        .await
        .map_err(|source| StageError::Topic {
            topic: topic.clone(),
            source,
        })?;
    Ok(secret)
}

#[instrument(skip_all, fields(topic = %channel_topic(channel)))]
pub async fn delete_topic(
    session: &AdminSession,
    channel: &KafkaChannel,
) -> Result<(), StageError> {
    let topic = channel_topic(channel);
    session
        .client()?
        .delete_topic(&topic)
        .await
        .map_err(|source| StageError::Topic {
            topic: topic.clone(),
            source,
        })?;
    info!("topic deleted");
    Ok(())
}

/// Parse an ISO-8601 duration into milliseconds. Years and months use fixed
/// 365 and 30 day lengths. Only the last component may carry a fraction
/// (`.` or `,`), which is kept to millisecond precision.
pub fn parse_iso8601_millis(input: &str) -> Option<i64> {
    const SEC: i64 = 1000;
    const DAY: i64 = 86_400 * SEC;
    const DATE_UNITS: [(char, i64); 4] =
        [('Y', 365 * DAY), ('M', 30 * DAY), ('W', 7 * DAY), ('D', DAY)];
    const TIME_UNITS: [(char, i64); 3] =
        [('H', 3_600 * SEC), ('M', 60 * SEC), ('S', SEC)];

    let rest = input.trim().strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, t),
        Some(_) => return None,
        None if rest.is_empty() => return None,
        None => (rest, ""),
    };

    let mut total: i64 = 0;
    let mut fraction_seen = false;
    for (part, units) in [(date, &DATE_UNITS[..]), (time, &TIME_UNITS[..])] {
        let mut num = String::new();
        let mut next_unit = 0usize;
        for ch in part.chars() {
            if ch.is_ascii_digit() || ch == '.' || ch == ',' {
                // a fractional component must be the last one
                if fraction_seen {
                    return None;
                }
                num.push(if ch == ',' { '.' } else { ch });
                continue;
            }
            let idx = units.iter().position(|(u, _)| *u == ch)?;
            if idx < next_unit || num.is_empty() {
                return None;
            }
            next_unit = idx + 1;
            let (millis, fractional) = component_millis(&num, units[idx].1)?;
            total = total.checked_add(millis)?;
            fraction_seen = fractional;
            num.clear();
        }
        if !num.is_empty() {
            return None;
        }
    }
    Some(total)
}

fn component_millis(num: &str, unit: i64) -> Option<(i64, bool)> {
    let (int, frac) = match num.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (num, None),
    };
    if int.is_empty() {
        return None;
    }
    let mut millis = int.parse::<i64>().ok()?.checked_mul(unit)?;
    let Some(frac) = frac else {
        return Some((millis, false));
    };
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac = &frac[..frac.len().min(6)];
    let scale = 10i64.pow(frac.len() as u32);
    let part = frac.parse::<i64>().ok()?.checked_mul(unit)? / scale;
    millis = millis.checked_add(part)?;
    Some((millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::KafkaChannelSpec;

    fn defaults() -> TopicDefaultsConfig {
        TopicDefaultsConfig {
            num_partitions: 4,
            replication_factor: 1,
            retention_ms: 604_800_000,
        }
    }

    #[test]
    fn parses_common_durations() {
        assert_eq!(parse_iso8601_millis("PT1H"), Some(3_600_000));
        assert_eq!(parse_iso8601_millis("P7D"), Some(604_800_000));
        assert_eq!(parse_iso8601_millis("P1W"), Some(604_800_000));
        assert_eq!(parse_iso8601_millis("P1DT12H30M5S"), Some(131_405_000));
        assert_eq!(parse_iso8601_millis("PT90S"), Some(90_000));
        assert_eq!(parse_iso8601_millis("P1Y"), Some(31_536_000_000));
        assert_eq!(parse_iso8601_millis("P1M"), Some(2_592_000_000));
        assert_eq!(parse_iso8601_millis("P1MT1M"), Some(2_592_060_000));
        assert_eq!(parse_iso8601_millis("PT1.5S"), Some(1_500));
        assert_eq!(parse_iso8601_millis("PT0,25S"), Some(250));
        assert_eq!(parse_iso8601_millis("P1.5D"), Some(129_600_000));
        assert_eq!(parse_iso8601_millis("PT0.001S"), Some(1));
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in [
            "", "P", "PT", "1H", "PT1X", "PTH", "P1H", "PT1S1H", "P1DT",
            "PT1.5M30S", "P1.5DT1H", "PT.5S", "PT1.S", "PT1.2.3S", "P1D1M",
        ] {
            assert_eq!(parse_iso8601_millis(bad), None, "{}", bad);
        }
    }

    #[test]
    fn topic_config_falls_back_to_defaults() {
        let kc = KafkaChannel::new("kc", KafkaChannelSpec::default());
        let cfg = topic_config(&kc, &defaults()).unwrap();
        assert_eq!(cfg.num_partitions, 4);
        assert_eq!(cfg.replication_factor, 1);
        assert_eq!(cfg.retention_ms, 604_800_000);
    }

    #[test]
    fn topic_config_prefers_spec() {
        let kc = KafkaChannel::new(
            "kc",
            KafkaChannelSpec {
                num_partitions: Some(12),
                replication_factor: Some(3),
                retention_duration: Some("PT1H".into()),
            },
        );
        let cfg = topic_config(&kc, &defaults()).unwrap();
        assert_eq!(cfg.num_partitions, 12);
        assert_eq!(cfg.replication_factor, 3);
        assert_eq!(cfg.retention_ms, 3_600_000);
    }

    #[test]
    fn topic_config_rejects_invalid_values() {
        let kc = KafkaChannel::new(
            "kc",
            KafkaChannelSpec {
                num_partitions: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(
            topic_config(&kc, &defaults()),
            Err(StageError::TopicConfig(_))
        ));
        let kc = KafkaChannel::new(
            "kc",
            KafkaChannelSpec {
                retention_duration: Some("forever".into()),
                ..Default::default()
            },
        );
        assert!(topic_config(&kc, &defaults()).is_err());
    }
}
