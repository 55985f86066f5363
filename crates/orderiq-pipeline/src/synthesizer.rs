//! Query synthesis.
//!
//! Builds the generation prompt from the static schema, the abbreviation
//! glossary, the nearest stored example, and the domain rule set, invokes
//! the language model once, and sanitizes the raw output into a single
//! read-only statement.
//!
//! Sanitization is deterministic and idempotent: fence markup is stripped,
//! everything before the first `SELECT`/`WITH` and after the last `;` is
//! discarded, and a statement containing a mutating keyword is blanked so
//! the execution stage reports it as an execution error.

use std::sync::{Arc, LazyLock};

use chrono::Local;
use regex::Regex;
use tracing::debug;

use crate::context::DomainContext;
use crate::error::{PipelineError, Result};
use crate::question::Question;
use crate::traits::{ExampleSearch, LanguageModel};

/// How many stored examples are retrieved per question.
const EXAMPLE_COUNT: usize = 1;

/// Markdown code-fence markers around generated statements.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^```sql\s*|^```|```$").expect("valid fence regex"));

/// First read keyword; everything before it is discarded.
static READ_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(select|with)\b").expect("valid keyword regex"));

/// Data-mutating verbs that must never survive sanitization.
static MUTATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create|truncate|merge|exec|grant)\b")
        .expect("valid mutation regex")
});

/// A sanitized read-only statement plus the context it was generated from.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    /// The sanitized statement.  May be empty when the model produced no
    /// recognizable read statement; execution reports that as an error.
    pub statement: String,
    /// The full question text the statement was generated for.
    pub question: String,
    /// The retrieved example block, when the search produced one.
    pub examples: Option<String>,
}

/// Generates one read-only statement per question.
pub struct QuerySynthesizer {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn ExampleSearch>,
    context: Arc<DomainContext>,
}

impl QuerySynthesizer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn ExampleSearch>,
        context: Arc<DomainContext>,
    ) -> Self {
        Self {
            llm,
            search,
            context,
        }
    }

    /// Retrieve the nearest stored example, assemble the prompt, invoke the
    /// model, and sanitize its output.
    ///
    /// Always returns a [`GeneratedQuery`]; an empty statement is valid
    /// output here and is reported as an execution error downstream.  Model
    /// and retrieval-transport failures are fatal for the request.
    pub async fn synthesize(&self, question: &Question) -> Result<GeneratedQuery> {
        let full_question = question.full_text();

        let retrieved = self
            .search
            .search(&full_question, EXAMPLE_COUNT)
            .await
            .map_err(|e| PipelineError::Synthesis {
                reason: e.to_string(),
            })?;

        // No match is not an error; the prompt simply carries no examples.
        let examples = if retrieved.is_empty() {
            None
        } else {
            Some(
                retrieved
                    .iter()
                    .map(|doc| doc.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        };

        let prompt = self.build_prompt(&full_question, examples.as_deref());
        let raw = self
            .llm
            .invoke(&prompt)
            .await
            .map_err(|e| PipelineError::Synthesis {
                reason: e.to_string(),
            })?;

        let statement = sanitize_statement(&raw);
        debug!(
            question = question.text(),
            statement = %statement,
            had_examples = examples.is_some(),
            "synthesized query"
        );

        Ok(GeneratedQuery {
            statement,
            question: full_question,
            examples,
        })
    }

    /// Assemble the generation prompt: schema, glossary, examples, rules.
    fn build_prompt(&self, question_text: &str, examples: Option<&str>) -> String {
        let current_year = Local::now().format("%Y");
        let schema = self.context.schema();
        let abbreviations = self.context.abbreviations();
        let examples_section = match examples {
            Some(text) => format!("\nReference examples from the example index:\n{text}\n"),
            None => String::new(),
        };

        format!(
            "You are an expert in generating accurate SQL queries for work order related user questions.\n\
             \n\
             ### Schema:\n\
             Only use these exact table and column names - no spelling changes, no assumptions, no corrections, no hallucinations:\n\
             {schema}\n\
             \n\
             ### Abbreviations:\n\
             You may encounter these abbreviations in user queries. Always expand and interpret them correctly:\n\
             {abbreviations}\n\
             Please use the following examples as reference to generate the SQL query:\n\
             {examples_section}\n\
             ## Rules for Generating SQL Queries:\n\
             - Never use any data modifying or altering statements in SQL (such as INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, etc.). Use only SELECT statements.\n\
             - If the user's question is a greeting (such as \"hi\", \"hello\", \"good morning\", etc.), respond ONLY with a friendly greeting message, and do NOT generate any SQL.\n\
             - Use only the tables and columns provided in the database schema above. Do not use or invent any other tables or columns.\n\
             - Do not modify the column names or data in any way.\n\
             - When no date specified use the current year {current_year}.\n\
             - Always include 'WHERE IsActive = 1' for ALL tables that have this column.\n\
             - Always include 'WHERE IsCutout = ''' for ALL tables that have this column.\n\
             - Never display these columns to users: 'WorkActivityFunctionID', 'IsActive', 'IsDeleted'\n\
             - Always alias 'JointID' as 'WeldNumber'.\n\
             - For multi-row subqueries, use IN rather than '='\n\
             \n\
             **Work Order Queries**:\n\
             - Always join TransmissionWorkOrder with TransmissionISO via TransmissionWorkOrderID\n\
             - When querying by Work Order Number, use WorkOrderNo column\n\
             - When querying by Work Order ID, use TransmissionWorkOrderID column\n\
             \n\
             **Weld/Joint Queries**:\n\
             - JointID in TransmissionISOMainJoint is the weld number\n\
             - Always include both heat numbers (SegCompFieldID1 and SegCompFieldID2) when returning weld info\n\
             - When joining to CompanyMTRFile:\n\
               - FIRST try using SegCompField1MTRFileID/SegCompField2MTRFileID\n\
               - If those are 0, fallback to SegCompFieldID1/SegCompFieldID2 (heat numbers). Always use 'HeatNumber' as the column name for heat numbers in CompanyMTRFile.\n\
             - For Welds/Weld number queries, always include these columns: JointID AS WeldNumber, SegCompFieldID1 AS HeatNumber1, SegCompFieldID2 AS HeatNumber2, SegCompField1MTRFileID, SegCompField2MTRFileID.\n\
             - When the user asks about assets used for a weld number (JointID):\n\
               - Always include these columns in the SELECT clause: JointID AS WeldNumber, HeatNumber, AssetCategoryDescription AS AssetCategory, SubCategoryDescription AS AssetSubCategory, MaterialDescription AS Material, SizeDescription AS MaterialSize, ManufacturerName AS Manufacturer\n\
               - When returning asset details for both SegCompField1 and SegCompField2, use two separate SELECT statements joined with UNION ALL, each returning the same columns and representing one asset.\n\
               - When joining to CompanyMTRFile, use SegCompField1MTRFileID or SegCompField2MTRFileID when not 0; if the MTRFileID = 0, fallback to matching using RTRIM(LTRIM(SegCompFieldID1 or SegCompFieldID2)) IN (SELECT items FROM dbo.Split(cmf.HeatNumber, ';')) OR cmf.SerialNumber = RTRIM(LTRIM(SegCompFieldID1 or SegCompFieldID2))\n\
             \n\
             **MTR File Queries**:\n\
             - When joining CompanyMTRFile to master tables: use AssetCategoryMaster for category descriptions, SizeMaster for size descriptions, MaterialMaster for material descriptions, ManufacturerMaster for manufacturer descriptions\n\
             \n\
             **Chemical/Mechanical Properties Queries**:\n\
             1. When the user asks for chemical or mechanical properties for a heat number or serial number:\n\
                - Always generate a query in the following format (replace the heat number as needed):\n\
                  SELECT top 1 BinaryString FROM CompanyMTRFile WHERE ('<HEAT_NUMBER>' IN (SELECT items FROM dbo.Split(HeatNumber, ';')) OR SerialNumber = '<HEAT_NUMBER>') AND IsActive = 1;\n\
                - Use the provided heat number or serial number from the user question in place of <HEAT_NUMBER>.\n\
             2. For user questions about the chemical or mechanical properties of a specific asset: consider the first row of the result set as asset1, the next row as asset2, and so on; get the HeatNumber or SerialNumber for that asset; then generate the same query as in 1, replacing <HEAT_NUMBER> accordingly.\n\
             \n\
             ## Output Format:\n\
             Your entire response MUST be ONLY the SQL query.\n\
             DO NOT include any introductory text, explanations, comments (unless they are part of the SQL query itself, e.g., in a `WITH` clause), or concluding remarks.\n\
             DO NOT wrap the SQL in markdown code blocks (```sql ... ```) or any other formatting characters.\n\
             Start directly with the SQL query (e.g., 'SELECT' or 'WITH').\n\
             End directly with a semicolon.\n\
             \n\
             User Question:\n\
             {question_text}\n\
             SQL:\n"
        )
    }
}

/// Deterministically post-process raw model output into a single read-only
/// statement.
///
/// Steps, in order: strip code fences and stray backticks; discard
/// everything before the first case-insensitive `SELECT`/`WITH` word (no
/// occurrence yields an empty statement); truncate after the last `;`;
/// blank the statement entirely when a mutating keyword survives.
pub fn sanitize_statement(raw: &str) -> String {
    let unfenced = FENCE_RE.replace_all(raw, "").replace('`', "");

    let Some(m) = READ_KEYWORD_RE.find(&unfenced) else {
        return String::new();
    };
    let mut statement = &unfenced[m.start()..];

    if let Some(pos) = statement.rfind(';') {
        statement = &statement[..=pos];
    }

    let statement = statement.trim();
    if MUTATING_RE.is_match(statement) {
        return String::new();
    }

    statement.to_owned()
}
