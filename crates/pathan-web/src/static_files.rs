//! 内置首页
//!
//! 单文件页面：登录、填写患者表单、上传切片、运行分析、追问和下载报告，
//! 全部通过 `/auth` 与 `/api/v1` 接口完成。

use axum::response::{Html, IntoResponse};
use pathan_core::{BiopsyMethod, Gender, SmokingStatus, TissueType};
use serde::Serialize;
use serde_json::Value;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PathanAI</title>
    <style>
        body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 0; background: #f4f6f9; color: #222; }
        .container { max-width: 960px; margin: 0 auto; padding: 24px; }
        .card { background: #fff; border-radius: 8px; padding: 20px; margin-bottom: 16px; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
        label { display: block; margin-top: 8px; font-size: .9rem; }
        input, select, textarea { width: 100%; padding: 6px; box-sizing: border-box; }
        button { margin-top: 12px; padding: 8px 16px; }
        pre { white-space: pre-wrap; }
        .hidden { display: none; }
        .error { color: #b00020; }
    </style>
</head>
<body>
<div class="container">
    <h1>PathanAI</h1>
    <div id="auth" class="card">
        <label>Имя <input id="name"></label>
        <label>Пароль <input id="password" type="password"></label>
        <button onclick="login()">Войти</button>
        <button onclick="register()">Регистрация</button>
    </div>
    <div id="work" class="hidden">
        <div class="card">
            <label>ФИО пациента <input id="p_name"></label>
            <label>Пол <select id="p_gender">{{gender}}</select></label>
            <label>Вес (кг) <input id="p_weight" type="number" step="0.1" value="70"></label>
            <label>Дата рождения <input id="p_birth" type="date" value="1980-01-01"></label>
            <label>Курение <select id="p_smoking">{{smoking}}</select></label>
            <label>Метод биопсии <select id="p_biopsy">{{biopsy_method}}</select></label>
            <label>Тип ткани <select id="p_tissue">{{tissue_type}}</select></label>
            <label>Анамнез <textarea id="p_anamnesis"></textarea></label>
            <button onclick="savePatient()">Сохранить</button>
        </div>
        <div class="card">
            <input id="file" type="file" accept="image/jpeg,image/png">
            <button onclick="upload()">Загрузить</button>
            <button onclick="run()">Анализ</button>
            <button onclick="download()">PDF</button>
            <button onclick="resetSession()">Сброс</button>
        </div>
        <div class="card"><pre id="result"></pre></div>
        <div class="card">
            <input id="question">
            <button onclick="ask()">Спросить</button>
            <pre id="chat"></pre>
        </div>
    </div>
    <p id="status" class="error"></p>
</div>
<script>
let token = null;
const $ = (id) => document.getElementById(id);
async function call(method, path, body, raw) {
    const headers = token ? { 'Authorization': 'Bearer ' + token } : {};
    let payload = body;
    if (body && !(body instanceof FormData)) { headers['Content-Type'] = 'application/json'; payload = JSON.stringify(body); }
    const resp = await fetch(path, { method, headers, body: payload });
    if (!resp.ok) { const err = await resp.json(); $('status').textContent = err.message; throw err; }
    $('status').textContent = '';
    return raw ? resp : resp.json();
}
async function login() {
    const r = await call('POST', '/auth/login', { name: $('name').value, password: $('password').value });
    token = r.token; $('auth').classList.add('hidden'); $('work').classList.remove('hidden'); refresh();
}
async function register() {
    await call('POST', '/auth/register', { name: $('name').value, password: $('password').value });
    $('status').textContent = 'OK';
}
async function savePatient() {
    await call('PUT', '/api/v1/session/patient', {
        name: $('p_name').value, gender: $('p_gender').value, weight_kg: parseFloat($('p_weight').value),
        birth_date: $('p_birth').value, smoking: $('p_smoking').value,
        biopsy_method: $('p_biopsy').value, tissue_type: $('p_tissue').value,
        anamnesis: $('p_anamnesis').value });
    refresh();
}
async function upload() {
    const form = new FormData(); form.append('file', $('file').files[0]);
    await call('POST', '/api/v1/session/image', form); refresh();
}
async function run() { $('result').textContent = '...'; await call('POST', '/api/v1/session/analysis'); refresh(); }
async function ask() { await call('POST', '/api/v1/session/chat', { question: $('question').value }); $('question').value = ''; refresh(); }
async function resetSession() { await call('POST', '/api/v1/session/reset'); refresh(); }
async function download() {
    const resp = await call('GET', '/api/v1/session/report', null, true);
    const url = URL.createObjectURL(await resp.blob());
    const a = document.createElement('a'); a.href = url; a.download = 'report.pdf'; a.click();
}
async function refresh() {
    const s = await call('GET', '/api/v1/session');
    $('result').textContent = s.result ? s.result.full_text : (s.last_error || s.state);
    $('chat').textContent = s.chat.map(t => t.role + ': ' + t.text).join('\n\n');
}
</script>
</body>
</html>
"#;

/// 首页处理器
pub async fn index() -> impl IntoResponse {
    Html(render_index())
}

/// 用各枚举的取值填充表单下拉框
pub fn render_index() -> String {
    INDEX_HTML
        .replace("{{gender}}", &options(&Gender::ALL, Gender::label))
        .replace("{{smoking}}", &options(&SmokingStatus::ALL, SmokingStatus::label))
        .replace("{{biopsy_method}}", &options(&BiopsyMethod::ALL, BiopsyMethod::label))
        .replace("{{tissue_type}}", &options(&TissueType::ALL, TissueType::label))
}

/// `value` 取序列化名，与表单提交的JSON一致
fn options<T: Serialize>(items: &[T], label: fn(&T) -> &'static str) -> String {
    items
        .iter()
        .filter_map(|item| match serde_json::to_value(item) {
            Ok(Value::String(value)) => Some(format!(
                "<option value=\"{}\">{}</option>",
                value,
                label(item)
            )),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathan_core::PatientRecord;

    #[test]
    fn test_index_offers_every_form_choice() {
        let html = render_index();
        assert!(!html.contains("{{"));
        assert!(html.contains("<option value=\"smear\">Мазок</option>"));
        assert!(html.contains("<option value=\"former\">"));
        assert!(html.contains("<option value=\"lymph_node\">Лимфоузел</option>"));
        assert!(html.contains("<option value=\"female\">"));
        assert!(html.contains("biopsy_method: $('p_biopsy').value"));
    }

    #[test]
    fn test_option_values_deserialize_into_patient_record() {
        let html = render_index();
        let value = html
            .split("<option value=\"")
            .skip(1)
            .filter_map(|rest| rest.split('"').next())
            .find(|v| *v == "smear")
            .unwrap();
        let patient: PatientRecord =
            serde_json::from_value(serde_json::json!({ "name": "X", "biopsy_method": value })).unwrap();
        assert_eq!(patient.biopsy_method, BiopsyMethod::Smear);
    }
}
