use cranelift_codegen::ir::Block;
use cranelift_module::Module;
use log::debug;

use crate::ast::{ControlFlow, ForLoop, IfStatement, Node};
use crate::frontend::context::FunctionContext;
use crate::frontend::error::{unsupported, CodegenError};
use crate::frontend::generator::GenerateIr;

impl<M: Module> FunctionContext<'_, '_, M> {
    /// Lowers a statement list in its own scope
    fn scoped_block(&mut self, body: &[Node]) {
        self.enter_scope();
        self.lower_statements(body);
        self.exit_scope();
    }

    /// if (c0) { b0 } elif (c1) { b1 } ... else { e }
    /// will be translated to:
    /// c0 calculation
    /// brif c0, then_0, else_1 (or end without alternatives)
    /// then_0:
    ///   b0
    ///   jump end
    /// else_1:
    ///   c1 calculation
    ///   brif c1, then_1, else_2 (or end if last and no else)
    /// ...
    /// else_n:
    ///   e
    ///   jump end
    /// end:
    ///   ...
    pub fn lower_if(&mut self, stmt: &IfStatement) {
        let label = self.session.next_construct();
        debug!("if_{}: {} elif branches, else: {}", label, stmt.elseifs.len(), stmt.else_block.is_some());
        let end_block = self.new_block("if_end");
        // One else block per elif, plus a final one for a plain else
        let else_count = stmt.elseifs.len() + usize::from(stmt.else_block.is_some());
        let else_blocks: Vec<_> = (0..else_count).map(|_| self.new_block("if_else")).collect();

        let then_block = self.new_block("if_then");
        let false_target = else_blocks.first().copied().unwrap_or(end_block);
        let cond = self.condition(&stmt.condition);
        self.branch(cond, then_block, false_target);
        self.lower_branch(then_block, &stmt.then_block, end_block);

        for (i, elif) in stmt.elseifs.iter().enumerate() {
            self.enter_block(else_blocks[i]);
            let then_block = self.new_block("elif_then");
            let false_target = else_blocks.get(i + 1).copied().unwrap_or(end_block);
            let cond = self.condition(&elif.condition);
            self.branch(cond, then_block, false_target);
            self.lower_branch(then_block, &elif.block, end_block);
        }

        if let Some(else_branch) = &stmt.else_block {
            self.lower_branch(else_blocks[stmt.elseifs.len()], &else_branch.block, end_block);
        }

        // every branch may have returned
        self.enter_block(end_block);
    }

    fn lower_branch(&mut self, block: Block, body: &[Node], end_block: Block) {
        if !self.enter_block(block) {
            return;
        }
        self.scoped_block(body);
        // The only case the branch is terminated is when its body ends with
        // return, break or continue
        self.seal_with_jump(end_block);
    }

    /// while (cond) { body }
    /// will be translated to:
    /// jump cond_bb
    /// cond_bb:
    ///   cond calculation
    ///   brif cond, body_bb, end_bb
    /// body_bb:
    ///   body
    ///   jump cond_bb
    /// end_bb:
    ///   ...
    pub fn lower_while(&mut self, condition: &Node, body: &[Node]) {
        let label = self.session.next_construct();
        debug!("while_{}", label);
        let cond_block = self.new_block("while_cond");
        let body_block = self.new_block("while_body");
        let end_block = self.new_block("while_end");

        self.jump(cond_block);
        self.enter_block(cond_block);
        let cond = self.condition(condition);
        self.branch(cond, body_block, end_block);

        self.enter_block(body_block);
        self.enter_loop(end_block, cond_block);
        self.scoped_block(body);
        self.exit_loop();
        self.seal_with_jump(cond_block);

        self.enter_block(end_block);
    }

    /// for (init; cond; step) { body }
    /// will be translated to:
    /// jump init_bb
    /// init_bb:
    ///   init
    ///   jump cond_bb
    /// cond_bb:
    ///   cond calculation
    ///   brif cond, body_bb, end_bb
    /// body_bb:
    ///   body
    ///   jump step_bb
    /// step_bb:
    ///   step
    ///   jump cond_bb
    /// end_bb:
    ///   ...
    /// The whole loop is one scope, so the variable declared in init is
    /// gone afterwards.
    pub fn lower_for(&mut self, stmt: &ForLoop) {
        let label = self.session.next_construct();
        debug!("for_{}", label);
        let init_block = self.new_block("for_init");
        let cond_block = self.new_block("for_cond");
        let step_block = self.new_block("for_step");
        let body_block = self.new_block("for_body");
        let end_block = self.new_block("for_end");

        self.enter_scope();
        self.jump(init_block);
        self.enter_block(init_block);
        if let Err(e) = stmt.init.generate(self) {
            self.session.diagnostics.report(e);
        }
        self.seal_with_jump(cond_block);

        if self.enter_block(cond_block) {
            let cond = self.condition(&stmt.condition);
            self.branch(cond, body_block, end_block);

            self.enter_block(body_block);
            self.enter_loop(end_block, step_block);
            self.scoped_block(&stmt.block);
            self.exit_loop();
            self.seal_with_jump(step_block);

            if self.enter_block(step_block) {
                if let Err(e) = stmt.step.generate(self) {
                    self.session.diagnostics.report(e);
                }
                self.seal_with_jump(cond_block);
            }
        }
        self.exit_scope();

        self.enter_block(end_block);
    }

    /// do { body } while (cond)
    /// will be translated to:
    /// jump body_bb
    /// body_bb:
    ///   body
    ///   jump cond_bb
    /// cond_bb:
    ///   cond calculation
    ///   brif cond, body_bb, end_bb
    /// end_bb:
    ///   ...
    pub fn lower_do_while(&mut self, condition: &Node, body: &[Node]) {
        let label = self.session.next_construct();
        debug!("do_while_{}", label);
        let body_block = self.new_block("do_body");
        let cond_block = self.new_block("do_cond");
        let end_block = self.new_block("do_end");

        self.jump(body_block);
        self.enter_block(body_block);
        self.enter_loop(end_block, cond_block);
        self.scoped_block(body);
        self.exit_loop();
        self.seal_with_jump(cond_block);

        if self.enter_block(cond_block) {
            let cond = self.condition(condition);
            self.branch(cond, body_block, end_block);
        }

        self.enter_block(end_block);
    }

    /// `break` leaves the innermost loop, `continue` re-enters it at its
    /// condition (or step, for `for` loops)
    pub fn lower_control_flow(&mut self, kind: ControlFlow) -> Result<(), CodegenError> {
        let Some(targets) = self.current_loop() else {
            let keyword = match kind {
                ControlFlow::Break => "break",
                ControlFlow::Continue => "continue",
            };
            return Err(unsupported(format!("`{}` outside of a loop", keyword)));
        };
        match kind {
            ControlFlow::Break => self.jump(targets.exit),
            ControlFlow::Continue => self.jump(targets.reentry),
        }
        Ok(())
    }
}
