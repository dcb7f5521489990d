//! SQL schema for the SINAPI SQLite store.
//!
//! Decimals are stored as TEXT to keep them exact. Dates are ISO 8601 TEXT so
//! that lexical and chronological order agree.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS precos (
    codigo          TEXT NOT NULL,
    descricao       TEXT NOT NULL,
    unidade         TEXT NOT NULL,
    preco_unitario  TEXT NOT NULL,
    fonte           TEXT NOT NULL,   -- 'dados_oficiais' | 'insumos' | 'composicoes'
    estado          TEXT NOT NULL,
    data_referencia TEXT NOT NULL,   -- YYYY-MM-DD, first day of the competência
    categoria       TEXT NOT NULL,
    PRIMARY KEY (codigo, fonte, estado, data_referencia)
);

-- The maintenance log is append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS manutencoes (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    codigo            TEXT NOT NULL,
    tipo_manutencao   TEXT NOT NULL,
    data_evento       TEXT NOT NULL,
    valor_anterior    TEXT,
    valor_novo        TEXT,
    codigo_substituto TEXT,
    descricao_motivo  TEXT
);

-- One row per code referenced by an active budget.
CREATE TABLE IF NOT EXISTS orcamento_codigos (
    orcamento_id   TEXT NOT NULL,
    tenant_id      TEXT NOT NULL,
    nome_orcamento TEXT NOT NULL,
    codigo         TEXT NOT NULL,
    PRIMARY KEY (orcamento_id, codigo)
);

CREATE TABLE IF NOT EXISTS status_snapshots (
    codigo        TEXT PRIMARY KEY,
    status        TEXT NOT NULL,
    verificado_em TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notificacoes (
    id                 TEXT PRIMARY KEY,
    tenant_id          TEXT NOT NULL,
    orcamento_id       TEXT NOT NULL,
    tipo               TEXT NOT NULL,
    titulo             TEXT NOT NULL,
    mensagem           TEXT NOT NULL,
    codigos_impactados TEXT NOT NULL DEFAULT '[]',   -- JSON array
    urgencia           TEXT NOT NULL,
    lida               INTEGER NOT NULL DEFAULT 0,
    criada_em          TEXT NOT NULL
);

-- One row per tenant; list columns are JSON arrays.
CREATE TABLE IF NOT EXISTS preferencias_notificacao (
    tenant_id         TEXT PRIMARY KEY,
    email_ativo       INTEGER NOT NULL DEFAULT 0,
    notif_desktop     INTEGER NOT NULL DEFAULT 0,
    codigos_favoritos TEXT NOT NULL DEFAULT '[]',
    tipos_alteracao   TEXT NOT NULL DEFAULT '[]',
    atualizado_em     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS precos_descricao_idx   ON precos(descricao);
CREATE INDEX IF NOT EXISTS manutencoes_codigo_idx ON manutencoes(codigo);
CREATE INDEX IF NOT EXISTS manutencoes_data_idx   ON manutencoes(data_evento);
CREATE INDEX IF NOT EXISTS orcamento_tenant_idx   ON orcamento_codigos(tenant_id);
CREATE INDEX IF NOT EXISTS notificacoes_tenant_idx ON notificacoes(tenant_id, criada_em);

PRAGMA user_version = 2;
";
