//! k6 JavaScript generation

use super::K6Scenario;
use crate::models::{QueryKind, QuerySpec};
use serde::Serialize;

const TEMPLATE: &str = r#"import http from 'k6/http';
import { check } from 'k6';
import encoding from 'k6/encoding';

const BASE_URL = __ENV.PTH_BASE_URL || '__BASE_URL__';
const QUERIES = __QUERIES__;

export const options = {
  scenarios: __SCENARIOS__,
  summaryTrendStats: ['avg', 'min', 'med', 'max', 'p(90)', 'p(95)', 'p(99)'],
};

function authHeaders() {
  if (__ENV.PTH_BEARER_TOKEN) {
    return { Authorization: `Bearer ${__ENV.PTH_BEARER_TOKEN}` };
  }
  if (__ENV.PTH_USERNAME) {
    const pair = `${__ENV.PTH_USERNAME}:${__ENV.PTH_PASSWORD || ''}`;
    return { Authorization: `Basic ${encoding.b64encode(pair)}` };
  }
  return {};
}

const HEADERS = authHeaders();

export default function () {
  const q = QUERIES[(__VU + __ITER) % QUERIES.length];
  let url;
  if (q.range_seconds > 0) {
    const end = Date.now() / 1000;
    const start = end - q.range_seconds;
    url = `${BASE_URL}/api/v1/query_range?query=${encodeURIComponent(q.promql)}&start=${start}&end=${end}&step=${q.step_seconds}`;
  } else {
    url = `${BASE_URL}/api/v1/query?query=${encodeURIComponent(q.promql)}`;
  }
  const res = http.get(url, { headers: HEADERS, tags: { query: q.name } });
  check(res, { 'status is 200': (r) => r.status === 200 });
}
"#;

#[derive(Serialize)]
struct ScriptQuery<'a> {
    name: &'a str,
    promql: &'a str,
    range_seconds: f64,
    step_seconds: f64,
}

fn script_queries(queries: &[QuerySpec]) -> Vec<ScriptQuery<'_>> {
    queries
        .iter()
        .map(|q| {
            let (range_seconds, step_seconds) = match &q.kind {
                QueryKind::Instant => (0.0, 0.0),
                QueryKind::Range { range, step } => (range.as_secs_f64(), step.as_secs_f64()),
            };
            ScriptQuery {
                name: &q.name,
                promql: &q.promql,
                range_seconds,
                step_seconds,
            }
        })
        .collect()
}

fn scenario_options(scenario: &K6Scenario) -> serde_json::Value {
    match scenario {
        K6Scenario::ConstantVus { vus, duration } => serde_json::json!({
            "soak": {
                "executor": "constant-vus",
                "vus": vus,
                "duration": format!("{}s", duration.as_secs().max(1)),
            }
        }),
        K6Scenario::ConstantArrivalRate {
            rate,
            duration,
            pre_allocated_vus,
            max_vus,
        } => serde_json::json!({
            "load": {
                "executor": "constant-arrival-rate",
                "rate": rate,
                "timeUnit": "1s",
                "duration": format!("{}s", duration.as_secs().max(1)),
                "preAllocatedVUs": pre_allocated_vus,
                "maxVUs": max_vus,
            }
        }),
    }
}

/// Build the k6 script for a scenario; queries are embedded as JSON and issued round robin
pub fn render_script(scenario: &K6Scenario, base_url: &str, queries: &[QuerySpec]) -> crate::error::Result<String> {
    let queries_json = serde_json::to_string_pretty(&script_queries(queries))?;
    let scenarios_json = serde_json::to_string_pretty(&scenario_options(scenario))?;
    // The base URL sits inside a single-quoted JS string
    let base_url = base_url.trim_end_matches('/').replace('\\', "\\\\").replace('\'', "\\'");

    Ok(TEMPLATE
        .replace("__BASE_URL__", &base_url)
        .replace("__QUERIES__", &queries_json)
        .replace("__SCENARIOS__", &scenarios_json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_queries, QueryClass};
    use std::time::Duration;

    #[test]
    fn test_constant_vus_script() {
        let scenario = K6Scenario::ConstantVus {
            vus: 10,
            duration: Duration::from_secs(1800),
        };
        let script = render_script(&scenario, "http://prom:9090/", &default_queries()).unwrap();

        assert!(script.contains("\"executor\": \"constant-vus\""));
        assert!(script.contains("\"duration\": \"1800s\""));
        assert!(script.contains("|| 'http://prom:9090'"));
        assert!(script.contains("encodeURIComponent(q.promql)"));
        assert!(script.contains("\"name\": \"http_request_rate\""));
        assert!(script.contains("'status is 200'"));
        assert!(!script.contains("__QUERIES__"));
    }

    #[test]
    fn test_arrival_rate_script_with_range_query() {
        let scenario = K6Scenario::ConstantArrivalRate {
            rate: 50,
            duration: Duration::from_secs(60),
            pre_allocated_vus: 20,
            max_vus: 200,
        };
        let queries = vec![QuerySpec::range(
            "series",
            "prometheus_tsdb_head_series",
            Duration::from_secs(3600),
            Duration::from_secs(60),
            QueryClass::Moderate,
        )];
        let script = render_script(&scenario, "http://prom:9090", &queries).unwrap();

        assert!(script.contains("\"executor\": \"constant-arrival-rate\""));
        assert!(script.contains("\"rate\": 50"));
        assert!(script.contains("\"maxVUs\": 200"));
        assert!(script.contains("\"range_seconds\": 3600.0"));
    }

    #[test]
    fn test_promql_is_json_escaped() {
        let scenario = K6Scenario::ConstantVus {
            vus: 1,
            duration: Duration::from_secs(10),
        };
        let queries = vec![QuerySpec::instant("quoted", "up{job=\"prometheus\"}", QueryClass::Simple)];
        let script = render_script(&scenario, "http://prom:9090", &queries).unwrap();
        assert!(script.contains(r#""promql": "up{job=\"prometheus\"}""#));
    }
}
