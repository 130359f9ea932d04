//! Single-page browser UI served at `/`

use crate::core::config::Config;

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>UI to HTML with Gemini</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1.5rem; color: #1f2933; }
  h1 { margin-top: 0; }
  .meta { color: #6b7280; font-size: .9rem; }
  #screenshot { max-width: 100%; border: 1px solid #e5e7eb; margin: 1rem 0; display: none; }
  button { padding: .5rem 1rem; border-radius: .375rem; border: 1px solid #d1d5db; background: #fff; cursor: pointer; }
  button.primary { background: #2563eb; color: #fff; border-color: #2563eb; }
  button:disabled { opacity: .5; cursor: default; }
  #progress { margin: 1rem 0; font-style: italic; }
  .stage-output { white-space: pre-wrap; background: #f9fafb; border: 1px solid #e5e7eb; padding: .75rem; margin: .5rem 0; }
  .message { border-radius: .5rem; padding: .75rem; margin: .5rem 0; white-space: pre-wrap; overflow-x: auto; }
  .message .role { font-weight: 600; display: block; margin-bottom: .25rem; }
  .message.user { background: #eff6ff; }
  .message.assistant, .message.initial { background: #f3f4f6; }
  #chat-form { display: flex; gap: .5rem; margin: 1rem 0; }
  #chat-input { flex: 1; padding: .5rem; }
  pre.code { background: #111827; color: #e5e7eb; padding: 1rem; overflow-x: auto; max-height: 400px; }
  iframe { width: 100%; height: 600px; border: 1px solid #e5e7eb; }
  .error { color: #b91c1c; }
  .hidden { display: none; }
</style>
</head>
<body>
<h1>UI to HTML with Gemini</h1>
<p class="meta">Model: {{MODEL}} &middot; CSS: {{FRAMEWORK}}</p>

<label>Choose an image... <input type="file" id="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png"></label>
<img id="screenshot" alt="Uploaded Image.">
<div id="controls" class="hidden">
  <button id="code-ui" class="primary">Code UI</button>
  <button id="cancel" disabled>Cancel</button>
</div>
<div id="progress"></div>
<div id="stages"></div>
<div id="error" class="error"></div>

<div id="chat" class="hidden">
  <div id="history"></div>
  <form id="chat-form">
    <input id="chat-input" placeholder="Ask a question or request a change" autocomplete="off">
    <button type="submit">Send</button>
  </form>
</div>

<div id="result" class="hidden">
  <pre class="code"><code id="code"></code></pre>
  <p>Preview:</p>
  <iframe id="preview" title="Preview"></iframe>
  <p><a id="download" class="button" download="index.html">Download HTML</a></p>
</div>

<script>
const $ = (id) => document.getElementById(id);
let sessionId = sessionStorage.getItem('ui-to-html-session');
let busy = false;

async function api(path, options = {}) {
  const response = await fetch(path, options);
  if (!response.ok) {
    let message = response.statusText;
    try { message = (await response.json()).error.message; } catch (_) {}
    const err = new Error(message);
    err.status = response.status;
    throw err;
  }
  return response;
}

async function ensureSession() {
  if (sessionId) {
    try { return await refresh(); } catch (e) { if (e.status !== 404) throw e; }
  }
  const created = await (await api('/api/sessions', { method: 'POST' })).json();
  sessionId = created.id;
  sessionStorage.setItem('ui-to-html-session', sessionId);
  return refresh();
}

async function refresh() {
  const state = await (await api(`/api/sessions/${sessionId}`)).json();
  render(state);
  return state;
}

function setBusy(value) {
  busy = value;
  $('code-ui').disabled = value;
  $('cancel').disabled = !value;
  $('chat-input').disabled = value;
}

function showError(message) { $('error').textContent = message ? `An error occurred: ${message}` : ''; }

function render(state) {
  if (state.has_image) {
    $('screenshot').src = `/api/sessions/${sessionId}/image?t=${Date.now()}`;
    $('screenshot').style.display = 'block';
    $('controls').classList.remove('hidden');
    $('chat').classList.remove('hidden');
  }
  const history = $('history');
  history.innerHTML = '';
  for (const entry of state.chat_history) {
    const div = document.createElement('div');
    const kind = entry.role === 'user' ? 'user' : (entry.role === 'assistant' ? 'assistant' : 'initial');
    div.className = `message ${kind}`;
    const role = document.createElement('span');
    role.className = 'role';
    role.textContent = entry.role;
    div.appendChild(role);
    div.appendChild(document.createTextNode(entry.text));
    history.appendChild(div);
  }
  if (state.refined_html) {
    $('result').classList.remove('hidden');
    $('code').textContent = state.refined_html;
    $('preview').src = `/api/sessions/${sessionId}/preview?t=${Date.now()}`;
    $('download').href = `/api/sessions/${sessionId}/download`;
  } else {
    $('result').classList.add('hidden');
  }
}

$('file').addEventListener('change', async (event) => {
  const file = event.target.files[0];
  if (!file) return;
  showError('');
  $('stages').innerHTML = '';
  const form = new FormData();
  form.append('file', file);
  try {
    await api(`/api/sessions/${sessionId}/image`, { method: 'POST', body: form });
    await refresh();
  } catch (e) { showError(e.message); }
});

function parseSse(buffer, onEvent) {
  let index;
  while ((index = buffer.indexOf('\n\n')) >= 0) {
    const chunk = buffer.slice(0, index);
    buffer = buffer.slice(index + 2);
    let name = 'message';
    const data = [];
    for (const line of chunk.split('\n')) {
      if (line.startsWith('event:')) name = line.slice(6).trim();
      else if (line.startsWith('data:')) data.push(line.slice(5).replace(/^ /, ''));
    }
    if (data.length) onEvent(name, JSON.parse(data.join('\n')));
  }
  return buffer;
}

$('code-ui').addEventListener('click', async () => {
  if (busy) return;
  setBusy(true);
  showError('');
  $('stages').innerHTML = '';
  try {
    const response = await api(`/api/sessions/${sessionId}/code-ui`, { method: 'POST' });
    const reader = response.body.getReader();
    const decoder = new TextDecoder();
    let buffer = '';
    for (;;) {
      const { value, done } = await reader.read();
      if (done) break;
      buffer = parseSse(buffer + decoder.decode(value, { stream: true }), (name, data) => {
        if (name === 'stage_started') $('progress').textContent = data.label;
        if (name === 'stage_finished' && (data.stage === 'describe' || data.stage === 'refine_description')) {
          const div = document.createElement('div');
          div.className = 'stage-output';
          div.textContent = data.text;
          $('stages').appendChild(div);
        }
        if (name === 'error') showError(data.message);
      });
    }
  } catch (e) { showError(e.message); }
  $('progress').textContent = '';
  setBusy(false);
  await refresh();
});

$('cancel').addEventListener('click', () => api(`/api/sessions/${sessionId}/cancel`, { method: 'POST' }).catch(() => {}));

$('chat-form').addEventListener('submit', async (event) => {
  event.preventDefault();
  const message = $('chat-input').value.trim();
  if (!message || busy) return;
  setBusy(true);
  showError('');
  $('progress').textContent = '🤖 Thinking...';
  try {
    await api(`/api/sessions/${sessionId}/chat`, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ message }),
    });
    $('chat-input').value = '';
  } catch (e) { showError(e.message); }
  $('progress').textContent = '';
  setBusy(false);
  await refresh();
});

ensureSession().catch((e) => showError(e.message));
</script>
</body>
</html>
"#;

/// Render the UI page for the configured model and framework
pub fn render_index(config: &Config) -> String {
    INDEX_TEMPLATE
        .replace("{{MODEL}}", &escape_html(&config.model))
        .replace("{{FRAMEWORK}}", &escape_html(&config.css_framework))
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
