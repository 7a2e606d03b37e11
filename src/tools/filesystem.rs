//! 文件工具：read_file / write_file / list_files（code 能力组）
//!
//! 相对路径按会话工作目录解析。read_file 对源码文件附带结构摘要（函数、类型、导入、测试函数），
//! write_file 区分新建与修改，供 Summarizer 统计。受保护路径不在此拦截，由 verify 阶段的审批策略处理。

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{Tool, ToolContext};

fn default_true() -> bool {
    true
}

#[derive(Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// 文件路径（绝对路径或相对当前目录）
    file_path: String,
    /// 是否分析源码结构
    #[serde(default = "default_true")]
    analyze_structure: bool,
}

#[derive(Deserialize, JsonSchema)]
struct WriteFileArgs {
    /// 文件路径（绝对路径或相对当前目录）
    file_path: String,
    /// 写入内容
    content: String,
    /// 为 true 时追加而非覆盖
    #[serde(default)]
    append: bool,
}

fn default_depth() -> usize {
    1
}

#[derive(Deserialize, JsonSchema)]
struct ListFilesArgs {
    /// 目录路径，缺省为当前目录
    #[serde(default)]
    directory: Option<String>,
    /// 递归深度，1 表示只列出直接子项
    #[serde(default = "default_depth")]
    max_depth: usize,
}

/// 读取文件，可选结构分析
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and return its content. For source files also returns a structure summary (functions, classes/types, imports, test functions)."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<ReadFileArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: ReadFileArgs = parse_args(args)?;
        let path = ctx.resolve(&args.file_path);
        tracing::info!(path = %path.display(), "read_file");

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| format!("File not found: {}", path.display()))?;
        if !meta.is_file() {
            return Err(format!("Path is not a file: {}", path.display()));
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Error reading file: {}", e))?;

        let mut payload = json!({
            "file_path": path.display().to_string(),
            "file_size": content.len(),
            "content": content,
        });
        if args.analyze_structure {
            if let Some(structure) = analyze_structure(&path, &content) {
                payload["structure"] = structure;
            }
        }
        Ok(payload)
    }
}

/// 写文件（新建 / 覆盖 / 追加）
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Set append=true to append instead of overwriting."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<WriteFileArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: WriteFileArgs = parse_args(args)?;
        let path = ctx.resolve(&args.file_path);
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        tracing::info!(path = %path.display(), existed, append = args.append, "write_file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Cannot create directory {}: {}", parent.display(), e))?;
        }

        if args.append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| format!("Error opening file: {}", e))?;
            file.write_all(args.content.as_bytes())
                .await
                .map_err(|e| format!("Error writing file: {}", e))?;
        } else {
            tokio::fs::write(&path, args.content.as_bytes())
                .await
                .map_err(|e| format!("Error writing file: {}", e))?;
        }

        let action = match (existed, args.append) {
            (false, _) => "created",
            (true, true) => "appended",
            (true, false) => "modified",
        };
        Ok(json!({
            "file_path": path.display().to_string(),
            "action": action,
            "created": !existed,
            "bytes_written": args.content.len(),
        }))
    }
}

/// 列目录（目录优先、按名称排序）
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories. Defaults to the current directory; max_depth > 1 lists recursively."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<ListFilesArgs>()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, String> {
        let args: ListFilesArgs = parse_args(args)?;
        let dir = match args.directory.as_deref() {
            Some(d) if !d.trim().is_empty() => ctx.resolve(d),
            _ => ctx.working_directory.clone(),
        };
        if !dir.exists() {
            return Err(format!("Directory not found: {}", dir.display()));
        }
        if !dir.is_dir() {
            return Err(format!("Path is not a directory: {}", dir.display()));
        }
        let depth = args.max_depth.clamp(1, 8);
        let root = dir.clone();
        let mut files = tokio::task::spawn_blocking(move || list_entries(&root, depth))
            .await
            .map_err(|e| format!("Error listing directory: {}", e))?;
        files.sort_by(|a, b| {
            let a_dir = a["is_directory"].as_bool().unwrap_or(false);
            let b_dir = b["is_directory"].as_bool().unwrap_or(false);
            b_dir
                .cmp(&a_dir)
                .then_with(|| a["name"].as_str().cmp(&b["name"].as_str()))
        });
        Ok(json!({
            "directory": dir.display().to_string(),
            "count": files.len(),
            "files": files,
        }))
    }
}

fn list_entries(root: &Path, depth: usize) -> Vec<Value> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let name = e
                .path()
                .strip_prefix(root)
                .unwrap_or(e.path())
                .display()
                .to_string();
            json!({
                "name": name,
                "is_directory": e.file_type().is_dir(),
                "is_file": e.file_type().is_file(),
            })
        })
        .collect()
}

/// 各语言的结构识别规则（按行匹配）
struct LanguageRules {
    language: &'static str,
    function: &'static str,
    types: &'static str,
    import: &'static str,
}

fn rules_for(path: &Path) -> Option<LanguageRules> {
    let ext = path.extension()?.to_str()?;
    let rules = match ext {
        "rs" => LanguageRules {
            language: "rust",
            function: r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)",
            types: r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+(\w+)",
            import: r"^\s*(?:pub\s+)?use\s+([^;]+);",
        },
        "py" => LanguageRules {
            language: "python",
            function: r"^\s*(?:async\s+)?def\s+(\w+)",
            types: r"^\s*class\s+(\w+)",
            import: r"^\s*(?:from\s+(\S+)\s+import|import\s+(\S+))",
        },
        "js" | "jsx" | "ts" | "tsx" => LanguageRules {
            language: if ext.starts_with('t') { "typescript" } else { "javascript" },
            function: r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)",
            types: r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|interface)\s+(\w+)",
            import: r#"^\s*import\s+.*?from\s+['"]([^'"]+)['"]"#,
        },
        "go" => LanguageRules {
            language: "go",
            function: r"^func\s+(?:\([^)]*\)\s*)?(\w+)",
            types: r"^type\s+(\w+)\s+(?:struct|interface)",
            import: r#"^\s*(?:import\s+)?"([^"]+)"\s*$"#,
        },
        "java" | "c" | "cpp" | "h" | "hpp" | "rb" | "php" => LanguageRules {
            language: "other",
            function: r"^\s*(?:def|function)\s+(\w+)",
            types: r"^\s*(?:public\s+|private\s+)?(?:class|struct|interface)\s+(\w+)",
            import: r"^\s*(?:#include|import|require)\s+(\S+)",
        },
        _ => return None,
    };
    Some(rules)
}

fn first_capture(re: &Regex, line: &str) -> Option<String> {
    let caps = re.captures(line)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().trim().to_string())
}

/// 源码结构摘要；非源码文件返回 None
pub fn analyze_structure(path: &Path, content: &str) -> Option<Value> {
    let rules = rules_for(path)?;
    let function_re = Regex::new(rules.function).ok()?;
    let types_re = Regex::new(rules.types).ok()?;
    let import_re = Regex::new(rules.import).ok()?;

    let mut functions = Vec::new();
    let mut classes = Vec::new();
    let mut imports = Vec::new();
    let mut test_functions = Vec::new();
    let mut test_attr_pending = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[test]") || trimmed.contains("::test]") {
            test_attr_pending = true;
            continue;
        }
        if let Some(name) = first_capture(&function_re, line) {
            let entry = json!({ "name": name, "line": idx + 1 });
            if test_attr_pending || name.starts_with("test_") || name.starts_with("Test") {
                test_functions.push(entry.clone());
            }
            functions.push(entry);
            test_attr_pending = false;
        } else if let Some(name) = first_capture(&types_re, line) {
            classes.push(json!({ "name": name, "line": idx + 1 }));
        } else if let Some(module) = first_capture(&import_re, line) {
            imports.push(module);
        }
    }

    Some(json!({
        "language": rules.language,
        "functions": functions,
        "classes": classes,
        "imports": imports,
        "test_functions": test_functions,
    }))
}
