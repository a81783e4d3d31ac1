pub const DAILY_DIGEST_TEMPLATE: &str = r#"
<html>
  <body style="font-family: sans-serif; color: #202124;">
    <h2>Your inbox digest</h2>
    {% if overview %}
    <p>{{ overview }}</p>
    {% endif %}
    <h3>Needs attention ({{ emails|length }})</h3>
    <ul>
      {% for email in emails %}
      <li>
        <strong>{{ email.sender }}</strong>: {{ email.subject }}
        {% if email.summary %}<br/><em>{{ email.summary }}</em>{% endif %}
      </li>
      {% endfor %}
    </ul>
    <p style="color: #5f6368; font-size: 12px;">
      Compiled automatically from the last 24 hours of CRITICAL and HIGH priority email.
    </p>
  </body>
</html>
"#;
