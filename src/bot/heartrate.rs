use std::sync::Arc;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::constants::HEART_RATE_RECONNECT;
use super::market::HeartStockMarket;

/* Heart-rate feed.
 * The monitor pushes frames over a websocket; only the heartRate field is
 * consumed. Frames feed straight into the stock market's sample ring. The
 * socket reconnects after a short pause whenever it drops.
 */

#[derive(Debug, Deserialize, PartialEq)]
pub struct HeartRateFrame {
    pub timestamp: i64,
    pub data: HeartRateData,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateData {
    pub heart_rate: f64,
}

// None for frames that are not heart-rate data.
pub fn parse_frame(raw: &str) -> Option<f64> {
    match serde_json::from_str::<HeartRateFrame>(raw) {
        Ok(frame) => Some(frame.data.heart_rate),
        Err(err) => {
            log::error!("unknown message in heart rate stream: {err}");
            None
        }
    }
}

/* Connects to the monitor and pumps samples into the market until the
 * process ends. Pass a fully authenticated URL, access token included.
 */
pub async fn run_heart_rate_feed(url: &str, market: Arc<HeartStockMarket>) {
    loop {
        match connect_async(url).await {
            Ok((mut stream, _)) => {
                log::info!("heart rate socket opened");
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(raw)) => {
                            if let Some(heart_rate) = parse_frame(&raw) {
                                market.push_sample(heart_rate);
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            log::error!("heart rate socket error: {err}");
                            break;
                        }
                    }
                }
                log::info!("heart rate socket closed");
            }
            Err(err) => log::error!("could not reach heart rate monitor: {err}"),
        }
        tokio::time::sleep(HEART_RATE_RECONNECT).await;
    }
}

#[cfg(test)]
mod tests {
    use super::parse_frame;

    #[test]
    fn test_parses_monitor_frame() {
        let raw = r#"{"timestamp": 1700000000, "data": {"heartRate": 72.5}}"#;
        assert_eq!(parse_frame(raw), Some(72.5));
    }

    #[test]
    fn test_rejects_unknown_frames() {
        assert_eq!(parse_frame(r#"{"hello": "world"}"#), None);
        assert_eq!(parse_frame("not json"), None);
    }
}
