//! Structured analyzer for Python: one tree-sitter parse, one tree walk to
//! collect functions/classes/imports, then per-function complexity and
//! essential-complexity visitors run directly over each collected node.

use super::{indent_sd, AnalysisResult};
use crate::models::{CKMetrics, FileEntry, FunctionCC, Language};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tree_sitter::{Node, Parser};

const INDENT_WIDTH: usize = 4;

struct FuncInfo {
    id: usize,
    name: String,
    line_start: usize,
    line_end: usize,
    enclosing_class_id: Option<usize>,
}

struct ClassInfo {
    id: usize,
    base_count: usize,
}

/// Parses `source` and runs the structured pipeline. Returns `None` on parse
/// failure so the caller falls through to the heuristic analyzer.
pub fn analyze(source: &str, path: &str, scan_id: i64) -> Option<AnalysisResult> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser.set_language(&language.into()).ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }
    let bytes = source.as_bytes();

    let mut functions = Vec::new();
    let mut classes = Vec::new();
    collect_definitions(root, bytes, &mut functions, &mut classes);
    let imports = collect_top_level_imports(root, bytes);

    let (file_complexity, max_nesting) = whole_tree_complexity(root);

    let nodes_by_id: HashMap<usize, Node> = {
        let mut map = HashMap::new();
        index_nodes(root, &mut map);
        map
    };

    let mut function_rows = Vec::new();
    let mut essential_max = 1.0f64;
    let mut fn_lengths = Vec::new();
    for f in &functions {
        let Some(&node) = nodes_by_id.get(&f.id) else { continue };
        let complexity = per_function_complexity(node);
        let essential = per_function_essential_complexity(node);
        essential_max = essential_max.max(essential);
        let is_dispatch = function_is_dispatch(node, bytes);
        fn_lengths.push((f.line_end - f.line_start + 1) as f64);
        function_rows.push(FunctionCC {
            path: path.to_string(),
            scan_id,
            function_name: f.name.clone(),
            line_start: f.line_start as i64,
            line_end: f.line_end as i64,
            complexity,
            essential_complexity: essential,
            is_dispatch,
        });
    }

    let avg_function_length = if fn_lengths.is_empty() {
        0.0
    } else {
        fn_lengths.iter().sum::<f64>() / fn_lengths.len() as f64
    };

    let entry = FileEntry {
        path: path.to_string(),
        scan_id,
        language: Language::Structured,
        loc: super::count_loc(source, "#"),
        cyclomatic_complexity: file_complexity,
        function_count: functions.len() as i64,
        max_nesting: max_nesting as i64,
        avg_function_length,
        essential_complexity: essential_max,
        indent_sd: indent_sd(source, "#", INDENT_WIDTH),
    };

    let ck = compute_ck_metrics(path, scan_id, &functions, &classes, &imports, &nodes_by_id, bytes);

    Some(AnalysisResult {
        entry,
        ck,
        functions: function_rows,
    })
}

fn index_nodes<'a>(node: Node<'a>, map: &mut HashMap<usize, Node<'a>>) {
    map.insert(node.id(), node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        index_nodes(child, map);
    }
}

fn is_def(kind: &str) -> bool {
    matches!(kind, "function_definition" | "async_function_definition")
}

fn nearest_enclosing_def(node: Node) -> Option<Node> {
    let mut cur = node.parent();
    while let Some(n) = cur {
        if is_def(n.kind()) || n.kind() == "class_definition" {
            return Some(n);
        }
        cur = n.parent();
    }
    None
}

fn collect_definitions(
    node: Node,
    source: &[u8],
    functions: &mut Vec<FuncInfo>,
    classes: &mut Vec<ClassInfo>,
) {
    if is_def(node.kind()) {
        let name = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let enclosing_class_id = nearest_enclosing_def(node).and_then(|p| {
            if p.kind() == "class_definition" {
                Some(p.id())
            } else {
                None
            }
        });
        functions.push(FuncInfo {
            id: node.id(),
            name,
            line_start: node.start_position().row + 1,
            line_end: node.end_position().row + 1,
            enclosing_class_id,
        });
    } else if node.kind() == "class_definition" {
        let mut base_count = 0;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "argument_list" {
                let mut arg_cursor = child.walk();
                base_count = child.named_children(&mut arg_cursor).count();
            }
        }
        classes.push(ClassInfo {
            id: node.id(),
            base_count,
        });
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definitions(child, source, functions, classes);
    }
}

fn collect_top_level_imports(root: Node, source: &[u8]) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        match node.kind() {
            "import_statement" => {
                let mut c = node.walk();
                for child in node.children(&mut c) {
                    if child.kind() == "dotted_name" {
                        if let Ok(text) = child.utf8_text(source) {
                            if let Some(first) = text.split('.').next() {
                                imports.insert(first.to_string());
                            }
                        }
                    } else if child.kind() == "aliased_import" {
                        if let Some(name_node) = child.child_by_field_name("name") {
                            if let Ok(text) = name_node.utf8_text(source) {
                                if let Some(first) = text.split('.').next() {
                                    imports.insert(first.to_string());
                                }
                            }
                        }
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module_node) = node.child_by_field_name("module_name") {
                    if let Ok(text) = module_node.utf8_text(source) {
                        if let Some(first) = text.split('.').next() {
                            imports.insert(first.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    imports
}

struct ComplexityState {
    complexity: f64,
    depth: usize,
    max_nesting: usize,
}

fn walk_complexity(node: Node, state: &mut ComplexityState, skip_nested_fns: bool) {
    let mut pop_depth = false;
    match node.kind() {
        "if_statement" | "elif_clause" | "while_statement" | "for_statement" | "except_clause" => {
            state.complexity += 1.0;
            state.depth += 1;
            state.max_nesting = state.max_nesting.max(state.depth);
            pop_depth = true;
        }
        "match_statement" => {
            state.depth += 1;
            state.max_nesting = state.max_nesting.max(state.depth);
            pop_depth = true;
        }
        "case_clause" => {
            state.complexity += 1.0;
        }
        "boolean_operator" => {
            state.complexity += 1.0;
        }
        "assert_statement" => {
            state.complexity += 1.0;
        }
        "list_comprehension" | "dictionary_comprehension" | "set_comprehension" | "generator_expression" => {
            state.complexity += 1.0;
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "if_clause" {
                    state.complexity += 1.0;
                }
            }
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if skip_nested_fns && is_def(child.kind()) {
            continue;
        }
        walk_complexity(child, state, skip_nested_fns);
    }
    if pop_depth {
        state.depth -= 1;
    }
}

fn whole_tree_complexity(root: Node) -> (f64, usize) {
    let mut state = ComplexityState {
        complexity: 1.0,
        depth: 0,
        max_nesting: 0,
    };
    walk_complexity(root, &mut state, false);
    (state.complexity, state.max_nesting)
}

fn per_function_complexity(func_node: Node) -> f64 {
    let mut state = ComplexityState {
        complexity: 1.0,
        depth: 0,
        max_nesting: 0,
    };
    // the function node itself is not a branch construct; walk its children.
    let mut cursor = func_node.walk();
    for child in func_node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        walk_complexity(child, &mut state, true);
    }
    state.complexity
}

struct EssentialState {
    value: f64,
    depth: usize,
    loop_depth: usize,
    except_depth: usize,
    return_depths: BTreeSet<usize>,
}

fn walk_essential(node: Node, source: &[u8], state: &mut EssentialState) {
    let mut pop_depth = false;
    let mut pop_loop = false;
    let mut pop_except = false;
    match node.kind() {
        "if_statement" | "elif_clause" | "match_statement" => {
            state.depth += 1;
            pop_depth = true;
        }
        "for_statement" | "while_statement" => {
            state.depth += 1;
            state.loop_depth += 1;
            pop_depth = true;
            pop_loop = true;
        }
        "except_clause" => {
            state.depth += 1;
            state.except_depth += 1;
            pop_depth = true;
            pop_except = true;
        }
        "break_statement" => {
            if state.loop_depth >= 1 {
                state.value += 1.0;
            }
        }
        "continue_statement" => {
            if state.loop_depth >= 2 {
                state.value += 1.0;
            }
        }
        "return_statement" => {
            state.return_depths.insert(state.depth);
        }
        "raise_statement" => {
            if state.except_depth > 0 && is_bare_raise(node, source) {
                state.value += 1.0;
            }
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        walk_essential(child, source, state);
    }
    if pop_depth {
        state.depth -= 1;
    }
    if pop_loop {
        state.loop_depth -= 1;
    }
    if pop_except {
        state.except_depth -= 1;
    }
}

fn is_bare_raise(node: Node, _source: &[u8]) -> bool {
    node.named_child_count() == 0
}

fn per_function_essential_complexity(func_node: Node) -> f64 {
    let mut state = EssentialState {
        value: 0.0,
        depth: 0,
        loop_depth: 0,
        except_depth: 0,
        return_depths: BTreeSet::new(),
    };
    let mut cursor = func_node.walk();
    for child in func_node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        walk_essential(child, &[], &mut state);
    }
    let return_bonus = state.return_depths.len().saturating_sub(1) as f64;
    1.0 + state.value + return_bonus
}

fn is_docstring_stmt(node: &Node, source: &[u8]) -> bool {
    node.kind() == "expression_statement"
        && node
            .named_child(0)
            .map(|c| c.kind() == "string")
            .unwrap_or(false)
        && node.utf8_text(source).is_ok()
}

fn body_has_control_flow(node: &Node) -> bool {
    if matches!(
        node.kind(),
        "if_statement" | "for_statement" | "while_statement" | "try_statement" | "with_statement" | "match_statement"
    ) {
        return true;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        if body_has_control_flow(&child) {
            return true;
        }
    }
    false
}

fn elif_or_else_clean(node: &Node) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "block" => {
                if body_has_control_flow(&child) {
                    return false;
                }
            }
            "elif_clause" | "else_clause" => {
                if !elif_or_else_clean(&child) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn if_chain_is_clean(if_node: &Node) -> bool {
    let mut cursor = if_node.walk();
    for child in if_node.children(&mut cursor) {
        match child.kind() {
            "block" => {
                if body_has_control_flow(&child) {
                    return false;
                }
            }
            "elif_clause" | "else_clause" => {
                if !elif_or_else_clean(&child) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn function_is_dispatch(func_node: Node, source: &[u8]) -> bool {
    let Some(body) = func_node.child_by_field_name("body") else {
        return false;
    };
    let mut cursor = body.walk();
    let mut stmts: Vec<Node> = body.named_children(&mut cursor).collect();
    if let Some(first) = stmts.first() {
        if is_docstring_stmt(first, source) {
            stmts.remove(0);
        }
    }
    if stmts.len() != 1 {
        return false;
    }
    match stmts[0].kind() {
        "match_statement" => true,
        "if_statement" => if_chain_is_clean(&stmts[0]),
        _ => false,
    }
}

fn compute_ck_metrics(
    path: &str,
    scan_id: i64,
    functions: &[FuncInfo],
    classes: &[ClassInfo],
    imports: &BTreeSet<String>,
    nodes_by_id: &HashMap<usize, Node>,
    source: &[u8],
) -> Option<CKMetrics> {
    if classes.is_empty() {
        if imports.is_empty() {
            return None;
        }
        let mut metrics = BTreeMap::new();
        metrics.insert("cbo".to_string(), imports.len() as f64);
        return Some(CKMetrics {
            path: path.to_string(),
            scan_id,
            metrics,
        });
    }

    let mut wmc = 0.0;
    let mut rfc = 0.0;
    let methods_by_class: HashMap<usize, Vec<usize>> = {
        let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
        for f in functions {
            if let Some(class_id) = f.enclosing_class_id {
                map.entry(class_id).or_default().push(f.id);
            }
        }
        map
    };

    for f in functions {
        if f.enclosing_class_id.is_some() {
            if let Some(&node) = nodes_by_id.get(&f.id) {
                wmc += per_function_complexity(node);
            }
            rfc += 1.0;
        }
    }

    for class in classes {
        if let Some(method_ids) = methods_by_class.get(&class.id) {
            for &mid in method_ids {
                if let Some(&node) = nodes_by_id.get(&mid) {
                    rfc += count_call_expressions(node);
                }
            }
        }
    }

    let direct_bases = classes.iter().map(|c| c.base_count).max().unwrap_or(0) as f64;

    let lcom = compute_lcom(classes, &methods_by_class, nodes_by_id, source);

    let mut metrics = BTreeMap::new();
    metrics.insert("wmc".to_string(), wmc);
    metrics.insert("cbo".to_string(), imports.len() as f64);
    metrics.insert("direct_bases".to_string(), direct_bases);
    metrics.insert("rfc".to_string(), rfc);
    metrics.insert("lcom".to_string(), lcom);
    Some(CKMetrics {
        path: path.to_string(),
        scan_id,
        metrics,
    })
}

fn count_call_expressions(node: Node) -> f64 {
    let mut count = 0.0;
    if node.kind() == "call" {
        count += 1.0;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        count += count_call_expressions(child);
    }
    count
}

fn self_attribute_names(func_node: Node, source: &[u8]) -> BTreeSet<String> {
    let mut attrs = BTreeSet::new();
    collect_self_attrs(func_node, source, &mut attrs);
    attrs
}

fn collect_self_attrs(node: Node, source: &[u8], attrs: &mut BTreeSet<String>) {
    if node.kind() == "attribute" {
        if let (Some(value), Some(attr)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("attribute"),
        ) {
            if value.kind() == "identifier" {
                if let (Ok(obj_name), Ok(attr_name)) = (value.utf8_text(source), attr.utf8_text(source)) {
                    if obj_name == "self" {
                        attrs.insert(attr_name.to_string());
                    }
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if is_def(child.kind()) {
            continue;
        }
        collect_self_attrs(child, source, attrs);
    }
}

fn compute_lcom(
    classes: &[ClassInfo],
    methods_by_class: &HashMap<usize, Vec<usize>>,
    nodes_by_id: &HashMap<usize, Node>,
    source: &[u8],
) -> f64 {
    if classes.is_empty() {
        return 0.0;
    }
    let mut values = Vec::new();
    for class in classes {
        let Some(method_ids) = methods_by_class.get(&class.id) else {
            values.push(0.0);
            continue;
        };
        if method_ids.len() < 2 {
            values.push(0.0);
            continue;
        }
        let attr_sets: Vec<BTreeSet<String>> = method_ids
            .iter()
            .filter_map(|id| nodes_by_id.get(id))
            .map(|&node| self_attribute_names(node, source))
            .collect();
        let mut total_pairs = 0;
        let mut sharing = 0;
        for i in 0..attr_sets.len() {
            for j in (i + 1)..attr_sets.len() {
                total_pairs += 1;
                if !attr_sets[i].is_disjoint(&attr_sets[j]) {
                    sharing += 1;
                }
            }
        }
        if total_pairs == 0 {
            values.push(0.0);
        } else {
            values.push(1.0 - (sharing as f64 / total_pairs as f64));
        }
    }
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_function_has_base_complexity() {
        let src = "def f():\n    return 1\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        assert_eq!(result.entry.cyclomatic_complexity, 1.0);
        assert_eq!(result.functions.len(), 1);
        assert_eq!(result.functions[0].complexity, 1.0);
    }

    #[test]
    fn branches_increment_complexity() {
        let src = "def f(x):\n    if x:\n        return 1\n    elif x == 2:\n        return 2\n    return 0\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        assert_eq!(result.functions[0].complexity, 3.0);
    }

    #[test]
    fn nested_function_does_not_count_toward_outer() {
        let src = "def outer():\n    def inner():\n        if True:\n            pass\n    return inner\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        let outer = result.functions.iter().find(|f| f.function_name == "outer").unwrap();
        assert_eq!(outer.complexity, 1.0);
        let inner = result.functions.iter().find(|f| f.function_name == "inner").unwrap();
        assert_eq!(inner.complexity, 2.0);
    }

    #[test]
    fn essential_complexity_counts_multiple_return_depths() {
        let src = "def f(x):\n    if x:\n        return 1\n    return 2\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        assert_eq!(result.functions[0].essential_complexity, 2.0);
    }

    #[test]
    fn dispatch_if_chain_detected() {
        let src = "def f(x):\n    if x == 1:\n        return 'a'\n    elif x == 2:\n        return 'b'\n    else:\n        return 'c'\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        assert!(result.functions[0].is_dispatch);
    }

    #[test]
    fn dispatch_false_when_branch_has_nested_control_flow() {
        let src = "def f(x):\n    if x == 1:\n        for y in x:\n            pass\n    else:\n        return 'c'\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        assert!(!result.functions[0].is_dispatch);
    }

    #[test]
    fn class_with_no_cohesion_yields_high_lcom() {
        let src = "class C:\n    def a(self):\n        self.x = 1\n    def b(self):\n        self.y = 2\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        let ck = result.ck.expect("should have ck metrics");
        assert_eq!(ck.metrics.get("lcom").copied(), Some(1.0));
    }

    #[test]
    fn no_classes_but_imports_yields_cbo_only() {
        let src = "import os\nimport sys\n\ndef f():\n    return 1\n";
        let result = analyze(src, "a.py", 1).expect("should parse");
        let ck = result.ck.expect("should have ck metrics");
        assert_eq!(ck.metrics.len(), 1);
        assert_eq!(ck.metrics.get("cbo").copied(), Some(2.0));
    }

    #[test]
    fn syntax_error_returns_none() {
        let src = "def f(:\n    return\n";
        assert!(analyze(src, "a.py", 1).is_none());
    }
}
