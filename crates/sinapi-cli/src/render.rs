//! Plain-text rendering of API responses.

use std::fmt::Write as _;

use sinapi_core::{
  maintenance::MaintenanceEvent,
  notify::{BudgetImpact, Notification, TipoImpacto},
  search::SearchPage,
  stats::MaintenanceStats,
  validation::{ValidationResult, ValidationSummary},
};

use crate::client::{BatchResult, HistoryResult, NotificationResult};

/// Cut `s` to at most `max` characters, marking the cut with `…`.
fn clip(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_owned()
  } else {
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
  }
}

pub fn search_page(page: &SearchPage) -> String {
  let mut out = String::new();
  if let Some(erro) = &page.erro_manutencao {
    let _ = writeln!(out, "warning: maintenance lookup failed ({erro}); status unknown");
  }
  for hit in &page.dados {
    let item = &hit.item;
    let _ = writeln!(
      out,
      "{:<12} {:<2} {:>12} {:<4} {:<14} {}",
      item.codigo,
      item.estado,
      item.preco_unitario,
      item.unidade,
      hit.manutencao_status.as_str(),
      clip(&item.descricao, 60),
    );
  }
  let _ = writeln!(
    out,
    "page {}/{} ({} results)",
    page.pagina,
    page.total_paginas.max(1),
    page.total
  );
  out
}

pub fn validation(r: &ValidationResult) -> String {
  let mut out = format!("{:<12} {}", r.codigo, r.status.as_str());
  if let Some(alt) = &r.codigo_alternativo {
    let _ = write!(out, "  → {alt}");
  }
  if let Some(v) = r.variacao_percentual {
    let sign = if v.is_sign_negative() { "" } else { "+" };
    let _ = write!(out, "  ({sign}{v}%)");
  }
  if let Some(item) = &r.item_atual {
    let _ = write!(out, "  {} {}/{}", item.preco_unitario, item.estado, item.unidade);
  }
  if r.alteracoes_recentes {
    out.push_str("  [recent]");
  }
  if !r.alternativas_sugeridas.is_empty() {
    let _ = write!(out, "  try: {}", r.alternativas_sugeridas.join(", "));
  }
  if let Some(erro) = &r.erro {
    let _ = write!(out, "  error: {erro}");
  }
  out.push('\n');
  out
}

fn summary(s: &ValidationSummary) -> String {
  format!(
    "{} codes: {} valid, {} deactivated, {} altered, {} not found, {} indeterminate",
    s.total, s.validos, s.desativados, s.alterados, s.nao_encontrados, s.indeterminados
  )
}

pub fn batch(b: &BatchResult) -> String {
  let mut out: String = b.resultados.iter().map(validation).collect();
  let _ = writeln!(out, "{} in {} ms", summary(&b.resumo), b.processado_em_ms);
  out
}

fn event_line(e: &MaintenanceEvent) -> String {
  let mut line = format!("{}  {:<12}", e.data_evento, e.tipo_manutencao.as_str());
  if let (Some(a), Some(n)) = (e.valor_anterior, e.valor_novo) {
    let _ = write!(line, "  {a} → {n}");
  }
  if let Some(s) = &e.codigo_substituto {
    let _ = write!(line, "  replaced by {s}");
  }
  if let Some(m) = &e.descricao_motivo {
    let _ = write!(line, "  {}", clip(m, 50));
  }
  line
}

pub fn history(h: &HistoryResult) -> String {
  if h.eventos.is_empty() {
    return format!("{}: no maintenance events\n", h.codigo);
  }
  let mut out = format!("{}\n", h.codigo);
  for e in &h.eventos {
    let _ = writeln!(out, "  {}", event_line(e));
  }
  out
}

pub fn stats(s: &MaintenanceStats) -> String {
  let mut out = format!(
    "{} events, {} in the last six months\n",
    s.total_eventos, s.eventos_recentes
  );
  for (tipo, n) in &s.por_tipo {
    let _ = writeln!(out, "  {tipo:<14} {n}");
  }
  out
}

fn impact(i: &BudgetImpact) -> String {
  let tipo = match i.tipo_impacto {
    TipoImpacto::Desativacao => "desativacao",
    TipoImpacto::Alteracao => "alteracao",
  };
  format!(
    "{} [{tipo}/{}] {}\n",
    i.nome_orcamento,
    i.urgencia.as_str(),
    i.codigos_impactados.join(", ")
  )
}

fn notification(n: &Notification) -> String {
  format!(
    "{} {} [{}]{} {}\n",
    n.criada_em.format("%Y-%m-%d %H:%M"),
    n.titulo,
    n.urgencia.as_str(),
    if n.lida { "" } else { " *" },
    n.codigos_impactados.join(", ")
  )
}

pub fn notifications(r: &NotificationResult) -> String {
  let d = &r.dados;
  let mut out = String::new();
  if let Some(v) = &d.varredura {
    let _ = writeln!(
      out,
      "{} codes checked, {} changed: {}",
      v.codigos_verificados,
      v.codigos_alterados.len(),
      v.codigos_alterados.join(", ")
    );
  }
  for i in d.impactos_encontrados.iter().flatten() {
    out.push_str(&impact(i));
  }
  for n in d.notificacoes.iter().flatten() {
    out.push_str(&notification(n));
  }
  if let Some(n) = d.notificacoes_enviadas {
    let _ = writeln!(out, "{n} notifications sent");
  }
  if let Some(p) = &d.preferencias {
    let on_off = |b: bool| if b { "on" } else { "off" };
    let tipos: Vec<&str> = p.tipos_alteracao.iter().map(|k| k.as_str()).collect();
    let _ = writeln!(
      out,
      "preferences saved: email {}, desktop {}, favourites [{}], kinds [{}]",
      on_off(p.email_ativo),
      on_off(p.notif_desktop),
      p.codigos_favoritos.join(", "),
      if tipos.is_empty() { "all".to_owned() } else { tipos.join(", ") }
    );
  }
  if out.is_empty() {
    let _ = writeln!(out, "{}: nothing to report", r.tipo_resposta);
  }
  out
}
