//! Vocabularies and surface patterns for rule-based extraction.

use crate::schema::Predicate;

pub const TECH_TERMS: &[&str] = &[
    // AI/ML
    "机器学习", "深度学习", "神经网络", "强化学习", "监督学习", "无监督学习",
    "卷积神经网络", "循环神经网络", "CNN", "RNN", "LSTM", "GRU",
    "自然语言处理", "计算机视觉", "NLP", "CV", "AI", "人工智能",
    "transformer", "Transformer", "BERT", "GPT", "attention", "Attention",
    "数据挖掘", "知识图谱", "推荐系统", "生成对抗网络", "GAN",
    // frameworks and infrastructure
    "TensorFlow", "PyTorch", "Keras", "Scikit-learn", "scikit-learn",
    "Docker", "Kubernetes", "K8s", "微服务", "云计算", "大数据",
    "Hadoop", "Spark", "Flink", "Kafka", "Redis", "MongoDB", "MySQL",
    // languages
    "Python", "Java", "JavaScript", "C++", "Go", "Rust", "TypeScript",
    // general engineering
    "API", "SDK", "框架", "算法", "模型", "数据集", "训练", "推理",
    "服务器", "数据库", "缓存", "消息队列", "负载均衡", "分布式",
    "前端", "后端", "全栈", "DevOps", "CI/CD", "容器", "虚拟化",
    // business
    "系统", "平台", "应用", "服务", "功能", "模块", "组件", "架构",
    "检测", "识别", "分析", "处理", "优化", "管理", "监控", "部署",
];

pub const ORG_SUFFIXES: &[&str] = &[
    "大学", "学院", "研究所", "实验室", "公司", "集团", "中心", "部门",
    "团队", "组织", "机构", "协会", "联盟", "基金会", "研究院",
];

pub const SURNAMES: &[char] = &[
    '王', '李', '张', '刘', '陈', '杨', '赵', '黄', '周', '吴',
    '徐', '孙', '胡', '朱', '高', '林', '何', '郭', '马', '罗',
];

pub const DATE_PATTERNS: &[&str] = &[
    r"\d{4}年\d{1,2}月\d{1,2}日",
    r"\d{4}年\d{1,2}月",
    r"\d{4}年",
    r"\d{4}-\d{1,2}-\d{1,2}",
    r"\d{4}/\d{1,2}/\d{1,2}",
];

pub const NUMBER_PATTERNS: &[&str] = &[
    r"\d+\.\d+%",
    r"\d+%",
    r"\d+\.\d+[公千米吨斤克]",
    r"\d+[万亿千百十][元人次个]",
];

/// CJK Unified Ideographs basic block, the range the name and
/// organisation patterns accept.
pub fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

pub fn is_known_term(text: &str) -> bool {
    TECH_TERMS.contains(&text) || ORG_SUFFIXES.contains(&text)
}

/// A surface pattern `{e1} … keyword … {e2}` on one line. When `tail` is
/// non-empty, one of its markers must follow `{e2}` on the same line.
#[derive(Debug, Clone, Copy)]
pub struct SurfacePattern {
    pub keyword: &'static str,
    pub tail: &'static [&'static str],
}

const BELONGS_TO: &[SurfacePattern] = &[
    SurfacePattern { keyword: "属于", tail: &[] },
    SurfacePattern { keyword: "是", tail: &["的一部分", "的组成"] },
];
const CONTAINS: &[SurfacePattern] = &[
    SurfacePattern { keyword: "包含", tail: &[] },
    SurfacePattern { keyword: "包括", tail: &[] },
    SurfacePattern { keyword: "含有", tail: &[] },
];
const USED_FOR: &[SurfacePattern] = &[
    SurfacePattern { keyword: "用于", tail: &[] },
    SurfacePattern { keyword: "应用于", tail: &[] },
    SurfacePattern { keyword: "服务于", tail: &[] },
];
const IMPLEMENTS: &[SurfacePattern] = &[
    SurfacePattern { keyword: "实现", tail: &[] },
    SurfacePattern { keyword: "完成", tail: &[] },
    SurfacePattern { keyword: "达成", tail: &[] },
];
const SUPPORTS: &[SurfacePattern] = &[
    SurfacePattern { keyword: "支持", tail: &[] },
    SurfacePattern { keyword: "兼容", tail: &[] },
    SurfacePattern { keyword: "适配", tail: &[] },
];
const DEPENDS_ON: &[SurfacePattern] = &[
    SurfacePattern { keyword: "依赖", tail: &[] },
    SurfacePattern { keyword: "需要", tail: &[] },
    SurfacePattern { keyword: "基于", tail: &[] },
];
const PRODUCES: &[SurfacePattern] = &[
    SurfacePattern { keyword: "产生", tail: &[] },
    SurfacePattern { keyword: "生成", tail: &[] },
    SurfacePattern { keyword: "输出", tail: &[] },
];
const PROCESSES: &[SurfacePattern] = &[
    SurfacePattern { keyword: "处理", tail: &[] },
    SurfacePattern { keyword: "分析", tail: &[] },
    SurfacePattern { keyword: "检测", tail: &[] },
];

pub fn surface_patterns(predicate: Predicate) -> &'static [SurfacePattern] {
    match predicate {
        Predicate::BelongsTo => BELONGS_TO,
        Predicate::Contains => CONTAINS,
        Predicate::UsedFor => USED_FOR,
        Predicate::Implements => IMPLEMENTS,
        Predicate::Supports => SUPPORTS,
        Predicate::DependsOn => DEPENDS_ON,
        Predicate::Produces => PRODUCES,
        Predicate::Processes => PROCESSES,
        Predicate::Related => &[],
    }
}
