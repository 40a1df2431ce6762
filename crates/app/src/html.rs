//! Embedded static HTML served by the viewer, bundled as `&'static str` so
//! the binary needs no filesystem lookups.

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Traffic Signal Monitor</title>
  <style>
    body { background: #111; color: #eee; font-family: monospace; margin: 0; padding: 2rem; }
    h1 { font-size: 1.2rem; letter-spacing: 0.1em; }
    img { max-width: 100%; border: 1px solid #333; }
    #status { margin-top: 1rem; }
    .light { display: inline-block; width: 1em; height: 1em; border-radius: 50%;
             background: #333; vertical-align: middle; margin-right: 0.5em; }
    .light.red { background: #e33; }
    .light.yellow { background: #ec3; }
    .light.green { background: #3c6; }
  </style>
</head>
<body>
  <h1>TRAFFIC SIGNAL MONITOR</h1>
  <img src="/video_feed" alt="live annotated stream">
  <div id="status">
    <span id="lamp" class="light"></span>
    <span id="signal">--</span> &middot; vehicles: <span id="count">--</span>
  </div>
  <script>
    async function poll() {
      try {
        const resp = await fetch('/traffic_status');
        if (resp.ok) {
          const status = await resp.json();
          document.getElementById('signal').textContent = status.traffic_light.toUpperCase();
          document.getElementById('count').textContent = status.vehicle_count;
          document.getElementById('lamp').className = 'light ' + status.traffic_light;
        }
      } catch (_) { /* server going away ends the stream; keep polling */ }
    }
    setInterval(poll, 1000);
    poll();
  </script>
</body>
</html>
"#;
